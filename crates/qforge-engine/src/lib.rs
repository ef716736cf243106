//! # QForge Engine
//!
//! The generation pipeline and its quality-closure loop: spec
//! generation, per-framework emission, validation with LLM repair,
//! coverage and mutation measurement, composite quality scoring, and the
//! checkpointed workspace runner orchestrating all of it.

pub mod coverage;
pub mod emitters;
pub mod fixer;
pub mod generator;
pub mod mutation;
pub mod process;
pub mod quality;
pub mod runner;
pub mod settings;
pub mod validator;
pub mod workspace;

pub use coverage::CoverageCollector;
pub use emitters::{EmitRequest, Emitter, EmitterRegistry};
pub use fixer::{FixOutcome, TestFixer};
pub use generator::SpecGenerator;
pub use mutation::{MutationBackend, MutationDriver};
pub use process::{ExecOutput, ProcessExecutor, TokioProcessExecutor};
pub use quality::{analyze_assertions, AssertionAnalysis, QualityScorer};
pub use runner::{
    scan_repository, ProgressEvent, RunnerCallbacks, RunnerConfig, WorkspaceRunner,
};
pub use settings::{EngineSettings, QualitySettings};
pub use validator::{TestFailureRecord, TestValidator, ValidationReport};
pub use workspace::{detect_repo_language, Workspace};
