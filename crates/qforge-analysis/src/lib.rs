//! # QForge Analysis
//!
//! Static analysis front end: tree-sitter based source extraction,
//! system model building with framework-detecting endpoint supplements,
//! and the deterministic test planner.

pub mod builder;
pub mod extractor;
pub mod planner;
pub mod supplements;

pub use builder::ModelBuilder;
pub use extractor::SourceExtractor;
pub use planner::{plan, PlanConfig};
pub use supplements::{default_supplements, FrameworkSupplement};
