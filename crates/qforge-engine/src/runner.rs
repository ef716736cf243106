//! # Workspace Runner
//!
//! State machine driving the whole pipeline: scan → model → plan →
//! per-target generate/validate/score, with crash-safe checkpointing
//! after every target, pause/cancel semantics, and bounded worker
//! parallelism over the intent queue.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use qforge_analysis::{plan as build_plan, ModelBuilder, PlanConfig, SourceExtractor};
use qforge_core::{
    redact_secrets, QForgeError, QResult, SourceLanguage, SpecSet, SystemModel, TargetKind,
    TargetState, TargetStatus, TestIntent, TestPlan, TestSpec, WorkspacePhase, WorkspaceState,
};
use qforge_llm::{LlmRouter, ModelTier};

use crate::coverage::CoverageCollector;
use crate::emitters::{emitter_for, EmitRequest, EmitterRegistry};
use crate::fixer::TestFixer;
use crate::generator::SpecGenerator;
use crate::mutation::MutationDriver;
use crate::process::ProcessExecutor;
use crate::quality::{analyze_assertions, QualityScorer};
use crate::settings::QualitySettings;
use crate::validator::TestValidator;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_workers: usize,
    pub max_intents: usize,
    pub validate_tests: bool,
    pub run_quality: bool,
    pub dry_run: bool,
    pub generation_tier: ModelTier,
    pub fix_tier: ModelTier,
    pub callback_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            max_intents: 100,
            validate_tests: true,
            run_quality: true,
            dry_run: false,
            generation_tier: ModelTier::Balanced,
            fix_tier: ModelTier::Fast,
            callback_timeout: Duration::from_secs(5),
        }
    }
}

/// Progress notification payload
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub target_id: String,
    pub status: TargetStatus,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    pub message: String,
}

pub type EventCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Synchronous observers; each invocation runs under a soft time budget
#[derive(Clone, Default)]
pub struct RunnerCallbacks {
    pub on_progress: Option<EventCallback>,
    pub on_complete: Option<EventCallback>,
    pub on_error: Option<EventCallback>,
}

pub struct WorkspaceRunner {
    shared: Arc<RunnerShared>,
}

struct RunnerShared {
    workspace: tokio::sync::Mutex<Workspace>,
    repo: PathBuf,
    generator: SpecGenerator,
    registry: EmitterRegistry,
    validator: Arc<TestValidator>,
    fixer: TestFixer,
    coverage: CoverageCollector,
    mutation: MutationDriver,
    scorer: QualityScorer,
    config: RunnerConfig,
    callbacks: RunnerCallbacks,
    paused: AtomicBool,
    collected_specs: tokio::sync::Mutex<Vec<TestSpec>>,
}

impl WorkspaceRunner {
    pub fn new(
        workspace: Workspace,
        repo: PathBuf,
        router: Arc<LlmRouter>,
        executor: Arc<dyn ProcessExecutor>,
        config: RunnerConfig,
        quality: QualitySettings,
        callbacks: RunnerCallbacks,
    ) -> Self {
        let validator = Arc::new(TestValidator::new(Arc::clone(&executor)));
        let shared = RunnerShared {
            workspace: tokio::sync::Mutex::new(workspace),
            repo,
            generator: SpecGenerator::new(Arc::clone(&router), config.generation_tier),
            registry: EmitterRegistry::with_defaults(),
            validator: Arc::clone(&validator),
            fixer: TestFixer::new(router, validator, config.fix_tier),
            coverage: CoverageCollector::new(Arc::clone(&executor)),
            mutation: MutationDriver::new(executor),
            scorer: QualityScorer::new(quality),
            config,
            callbacks,
            paused: AtomicBool::new(false),
            collected_specs: tokio::sync::Mutex::new(Vec::new()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Request a graceful stop: in-flight targets finish, state is
    /// flushed, and the workspace parks in the `paused` phase.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    /// Drive the workspace to completion (or pause/cancellation)
    pub async fn run(&self, cancel: &CancellationToken) -> QResult<WorkspaceState> {
        let shared = &self.shared;

        {
            let ws = shared.workspace.lock().await;
            if ws.state.is_terminal() {
                return Ok(ws.state.clone());
            }
        }

        let (model, plan) = shared.prepare(cancel).await?;
        let model = Arc::new(model);

        let pending: Vec<TestIntent> = {
            let ws = shared.workspace.lock().await;
            plan.intents
                .iter()
                .filter(|intent| {
                    ws.state
                        .targets
                        .iter()
                        .any(|t| {
                            t.id == intent_key(intent)
                                && matches!(
                                    t.status,
                                    TargetStatus::Pending | TargetStatus::InProgress
                                )
                        })
                })
                .cloned()
                .collect()
        };

        if pending.is_empty() {
            shared.set_phase(WorkspacePhase::Complete).await?;
            let state = shared.snapshot().await;
            shared
                .emit(&shared.callbacks.on_complete.clone(), ProgressEvent {
                    target_id: String::new(),
                    status: TargetStatus::Completed,
                    completed: state.completed_targets,
                    failed: state.failed_targets,
                    total: state.total_targets,
                    message: "workspace complete".to_string(),
                })
                .await;
            return Ok(state);
        }

        shared.set_phase(WorkspacePhase::Generating).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<TestIntent>(pending.len());
        for intent in pending {
            // capacity equals queue length; this never blocks
            let _ = tx.send(intent).await;
        }
        drop(tx);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = shared.config.max_workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let shared = Arc::clone(shared);
            let model = Arc::clone(&model);
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, shared, model, rx, cancel).await
            }));
        }

        let mut fatal: Option<QForgeError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(QForgeError::Cancelled)) => {
                    fatal.get_or_insert(QForgeError::Cancelled);
                }
                Ok(Err(err)) => {
                    error!(error = %err, "worker hit a fatal error");
                    fatal = Some(err);
                }
                Err(join_err) => {
                    fatal = Some(QForgeError::Generic(anyhow::anyhow!(
                        "worker panicked: {join_err}"
                    )));
                }
            }
        }

        if let Some(err) = fatal {
            if matches!(err, QForgeError::Cancelled) {
                // cancel aborts without a phase transition; resume picks up
                // from the last checkpoint
                return Err(QForgeError::Cancelled);
            }
            let _ = shared.set_phase(WorkspacePhase::Failed).await;
            return Err(err);
        }

        if shared.paused.load(Ordering::SeqCst) {
            shared.set_phase(WorkspacePhase::Paused).await?;
            info!("runner paused, state flushed");
            return Ok(shared.snapshot().await);
        }

        shared.set_phase(WorkspacePhase::Complete).await?;
        let state = shared.snapshot().await;
        shared
            .emit(&shared.callbacks.on_complete.clone(), ProgressEvent {
                target_id: String::new(),
                status: TargetStatus::Completed,
                completed: state.completed_targets,
                failed: state.failed_targets,
                total: state.total_targets,
                message: "workspace complete".to_string(),
            })
            .await;
        Ok(state)
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<RunnerShared>,
    model: Arc<SystemModel>,
    rx: Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<TestIntent>>>,
    cancel: CancellationToken,
) -> QResult<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(QForgeError::Cancelled);
        }
        if shared.paused.load(Ordering::SeqCst) {
            return Ok(());
        }

        let intent = { rx.lock().await.recv().await };
        let Some(intent) = intent else {
            return Ok(());
        };

        info!(worker_id, target = %intent.target_id, "processing target");
        shared.process_target(&intent, &model, &cancel).await?;
    }
}

/// Target ids repeat across levels (an endpoint backs both an api and an
/// e2e intent); the per-target state key includes the level.
fn intent_key(intent: &TestIntent) -> String {
    let level = match intent.level {
        qforge_core::IntentLevel::Unit => "unit",
        qforge_core::IntentLevel::Api => "api",
        qforge_core::IntentLevel::E2e => "e2e",
    };
    format!("{level}:{}", intent.target_id)
}

impl RunnerShared {
    /// Plan on first run; reload snapshots on resume
    async fn prepare(&self, _cancel: &CancellationToken) -> QResult<(SystemModel, TestPlan)> {
        let fresh = {
            let ws = self.workspace.lock().await;
            ws.state.targets.is_empty()
                && matches!(ws.state.phase, WorkspacePhase::Init | WorkspacePhase::Planning)
        };

        if !fresh {
            let ws = self.workspace.lock().await;
            let model = ws.load_model().await?;
            let plan = ws.load_plan().await?;
            info!(intents = plan.intents.len(), "resuming from checkpoint");
            return Ok((model, plan));
        }

        self.set_phase(WorkspacePhase::Planning).await?;

        let (repository, branch) = {
            let ws = self.workspace.lock().await;
            (ws.state.repo_url.clone(), ws.state.branch.clone())
        };

        let files = scan_repository(&self.repo);
        let mut builder = ModelBuilder::new(&repository, &branch, "");
        let file_count = files.len();
        for file in files {
            builder.add_file(file);
        }
        let model = builder.build()?;
        let plan = build_plan(
            &model,
            &PlanConfig {
                max_intents: self.config.max_intents,
            },
        );
        info!(
            files = file_count,
            functions = model.functions.len(),
            intents = plan.intents.len(),
            "planning finished"
        );

        {
            let mut ws = self.workspace.lock().await;
            ws.write_model(&model).await?;
            ws.write_plan(&plan).await?;

            ws.state.targets = plan
                .intents
                .iter()
                .map(|intent| TargetState {
                    id: intent_key(intent),
                    status: TargetStatus::Pending,
                    test_file: None,
                    last_error: None,
                })
                .collect();
            ws.state.total_targets = plan.intents.len() as u64;
            ws.checkpoint().await?;
        }

        Ok((model, plan))
    }

    /// Full per-target pipeline. Only fatal errors (checkpointing,
    /// cancellation) propagate; everything else is recorded on the
    /// target and counted.
    async fn process_target(
        &self,
        intent: &TestIntent,
        model: &SystemModel,
        cancel: &CancellationToken,
    ) -> QResult<()> {
        let key = intent_key(intent);

        self.update_target(&key, TargetStatus::InProgress, None, None).await?;
        self.emit(&self.callbacks.on_progress.clone(), self.event(&key, TargetStatus::InProgress, "started").await)
            .await;

        match self.run_pipeline(intent, model, cancel).await {
            Ok(test_file) => {
                {
                    let mut ws = self.workspace.lock().await;
                    ws.state.completed_targets += 1;
                    if let Some(target) = ws.state.target_mut(&key) {
                        target.status = TargetStatus::Completed;
                        target.test_file = test_file.clone();
                    }
                    ws.checkpoint().await?;
                }
                self.emit(&self.callbacks.on_progress.clone(), self.event(&key, TargetStatus::Completed, "completed").await)
                    .await;
                Ok(())
            }
            Err(QForgeError::Cancelled) => Err(QForgeError::Cancelled),
            Err(QForgeError::Checkpoint { path, reason }) => {
                Err(QForgeError::Checkpoint { path, reason })
            }
            Err(err) => {
                let redacted = redact_secrets(&err.to_string());
                warn!(target = %key, error = %redacted, "target failed");
                {
                    let mut ws = self.workspace.lock().await;
                    ws.state.failed_targets += 1;
                    if let Some(target) = ws.state.target_mut(&key) {
                        target.status = TargetStatus::Failed;
                        target.last_error = Some(redacted.clone());
                    }
                    ws.checkpoint().await?;
                }
                self.emit(&self.callbacks.on_error.clone(), self.event(&key, TargetStatus::Failed, &redacted).await)
                    .await;
                Ok(())
            }
        }
    }

    async fn run_pipeline(
        &self,
        intent: &TestIntent,
        model: &SystemModel,
        cancel: &CancellationToken,
    ) -> QResult<Option<String>> {
        self.set_phase(WorkspacePhase::Generating).await?;

        let specs = self.generator.generate(intent, model, cancel).await?;
        self.record_specs(model, &specs).await;

        let ctx = target_context(intent, model)?;
        let emitter = emitter_for(&self.registry, &ctx.language)?;
        let emitted = emitter.emit(&EmitRequest {
            symbol: &ctx.symbol,
            module: &ctx.module,
            specs: &specs,
        })?;

        let relative = ctx.dir.join(&emitted.path);
        if self.config.dry_run {
            return Ok(Some(relative.display().to_string()));
        }

        // the test runs inside the repo clone; the workspace keeps a copy
        let repo_test_path = self.repo.join(&relative);
        if let Some(parent) = repo_test_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&repo_test_path, &emitted.source).await?;
        {
            let ws = self.workspace.lock().await;
            ws.write_test_file(&relative, &emitted.source).await?;
        }

        if self.config.validate_tests {
            self.set_phase(WorkspacePhase::Validating).await?;
            let outcome = self
                .fixer
                .fix(cancel, &self.repo, &repo_test_path, &ctx.language)
                .await?;
            if !outcome.fixed {
                return Err(QForgeError::Protocol {
                    reason: format!(
                        "tests still failing after {} repair attempts",
                        outcome.attempts
                    ),
                });
            }
            if let Some(new_code) = &outcome.new_code {
                let ws = self.workspace.lock().await;
                ws.write_test_file(&relative, new_code).await?;
            }
        }

        if self.config.run_quality {
            self.set_phase(WorkspacePhase::Scoring).await?;
            let final_code = tokio::fs::read_to_string(&repo_test_path).await?;

            let coverage = match self.coverage.collect(cancel, &self.repo, &ctx.language).await {
                Ok(report) => Some(report),
                Err(QForgeError::Cancelled) => return Err(QForgeError::Cancelled),
                Err(err) => {
                    warn!(error = %err, "coverage collection failed");
                    None
                }
            };
            let mutation = match self
                .mutation
                .run(cancel, &self.repo, &ctx.source_file, &relative.display().to_string())
                .await
            {
                Ok(result) => Some(result),
                Err(QForgeError::Cancelled) => return Err(QForgeError::Cancelled),
                Err(err) => {
                    warn!(error = %err, "mutation testing failed");
                    None
                }
            };

            let analysis = analyze_assertions(&final_code, &ctx.language, &ctx.symbol);
            let target_covered = coverage.as_ref().map(|report| {
                report
                    .file(&ctx.source_file)
                    .map(|f| f.covered_lines > 0)
                    .unwrap_or(false)
            });
            let score = self
                .scorer
                .score(&analysis, coverage.as_ref(), mutation.as_ref(), target_covered);

            {
                let ws = self.workspace.lock().await;
                if let Some(report) = &coverage {
                    ws.write_coverage(report).await?;
                }
                if let Some(result) = &mutation {
                    ws.write_mutation(result).await?;
                }
                ws.write_quality(&score).await?;
            }

            if let Some(reason) = score.should_regenerate() {
                // one regeneration round through generate → emit → validate
                info!(target = %intent.target_id, reason, "regenerating low-quality test");
                let specs = self.generator.generate(intent, model, cancel).await?;
                let emitted = emitter.emit(&EmitRequest {
                    symbol: &ctx.symbol,
                    module: &ctx.module,
                    specs: &specs,
                })?;
                tokio::fs::write(&repo_test_path, &emitted.source).await?;
                {
                    let ws = self.workspace.lock().await;
                    ws.write_test_file(&relative, &emitted.source).await?;
                }
                if self.config.validate_tests {
                    let _ = self
                        .fixer
                        .fix(cancel, &self.repo, &repo_test_path, &ctx.language)
                        .await?;
                }
            }
        }

        Ok(Some(relative.display().to_string()))
    }

    async fn record_specs(&self, model: &SystemModel, specs: &[TestSpec]) {
        let mut collected = self.collected_specs.lock().await;
        collected.extend_from_slice(specs);
        let snapshot = SpecSet {
            model_id: model.commit.clone(),
            repository: model.repository.clone(),
            specs: collected.clone(),
        };
        drop(collected);

        let ws = self.workspace.lock().await;
        if let Err(err) = ws.write_specs(&snapshot).await {
            warn!(error = %err, "failed to persist specs artifact");
        }
    }

    async fn set_phase(&self, phase: WorkspacePhase) -> QResult<()> {
        let mut ws = self.workspace.lock().await;
        if ws.state.phase != phase {
            ws.state.phase = phase;
            ws.checkpoint().await?;
        }
        Ok(())
    }

    async fn update_target(
        &self,
        key: &str,
        status: TargetStatus,
        test_file: Option<String>,
        last_error: Option<String>,
    ) -> QResult<()> {
        let mut ws = self.workspace.lock().await;
        if let Some(target) = ws.state.target_mut(key) {
            target.status = status;
            if test_file.is_some() {
                target.test_file = test_file;
            }
            if last_error.is_some() {
                target.last_error = last_error;
            }
        }
        ws.checkpoint().await
    }

    async fn snapshot(&self) -> WorkspaceState {
        self.workspace.lock().await.state.clone()
    }

    async fn event(&self, target_id: &str, status: TargetStatus, message: &str) -> ProgressEvent {
        let state = self.snapshot().await;
        ProgressEvent {
            target_id: target_id.to_string(),
            status,
            completed: state.completed_targets,
            failed: state.failed_targets,
            total: state.total_targets,
            message: message.to_string(),
        }
    }

    /// Callbacks are synchronous and untrusted; each runs on the blocking
    /// pool under a soft time budget.
    async fn emit(&self, callback: &Option<EventCallback>, event: ProgressEvent) {
        let Some(callback) = callback else {
            return;
        };
        let callback = Arc::clone(callback);
        let budget = self.config.callback_timeout;
        let result = tokio::time::timeout(
            budget,
            tokio::task::spawn_blocking(move || callback(event)),
        )
        .await;
        if result.is_err() {
            warn!("progress callback exceeded its time budget");
        }
    }
}

struct TargetContext {
    symbol: String,
    module: String,
    /// directory of the generated test, relative to the repo root
    dir: PathBuf,
    language: String,
    source_file: String,
}

fn target_context(intent: &TestIntent, model: &SystemModel) -> QResult<TargetContext> {
    let (symbol, file) = match intent.target_kind {
        TargetKind::Function | TargetKind::Method => {
            let func = model
                .resolve_function(&intent.target_id)
                .ok_or_else(|| QForgeError::Input {
                    reason: format!("unknown function target {}", intent.target_id),
                })?;
            (func.name.clone(), func.file.clone())
        }
        TargetKind::Endpoint | TargetKind::Block => {
            let endpoint = model
                .endpoints
                .iter()
                .find(|e| e.id == intent.target_id)
                .ok_or_else(|| QForgeError::Input {
                    reason: format!("unknown endpoint target {}", intent.target_id),
                })?;
            (
                format!("{} {}", endpoint.method, endpoint.path),
                endpoint.file.clone(),
            )
        }
        TargetKind::Class => {
            return Err(QForgeError::Input {
                reason: "class targets are not planned directly".to_string(),
            })
        }
    };

    let path = Path::new(&file);
    let language = SourceLanguage::from_path(path)
        .map(|l| l.tag().to_string())
        .unwrap_or_else(|| "go".to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let module = match language.as_str() {
        // go tests share the package of their directory
        "go" => dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "main".to_string()),
        _ => path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "module".to_string()),
    };

    Ok(TargetContext {
        symbol,
        module,
        dir,
        language,
        source_file: file,
    })
}

const SKIPPED_DIRS: [&str; 11] = [
    ".git",
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    "coverage",
    ".idea",
];

/// Walk the repository, parsing every supported source file. Single-file
/// parse failures are logged and skipped; the scan continues.
pub fn scan_repository(repo: &Path) -> Vec<qforge_core::ParsedFile> {
    let extractor = SourceExtractor::new();
    let mut files = Vec::new();
    let mut stack = vec![repo.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        children.sort();

        for path in children {
            if path.is_dir() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if !SKIPPED_DIRS.contains(&name.as_str()) && !name.starts_with('.') {
                    stack.push(path);
                }
                continue;
            }

            let Some(language) = SourceLanguage::from_path(&path) else {
                continue;
            };
            let relative = path
                .strip_prefix(repo)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();

            match std::fs::read_to_string(&path) {
                Ok(source) => match extractor.parse_source(&relative, &source, language) {
                    Ok(parsed) => files.push(parsed),
                    Err(err) => warn!(file = %relative, error = %err, "parse failed, skipping"),
                },
                Err(err) => warn!(file = %relative, error = %err, "unreadable file, skipping"),
            }
        }
    }

    // deterministic model input ordering regardless of walk order
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_key_disambiguates_levels() {
        let intent = |level| TestIntent {
            level,
            target_kind: TargetKind::Endpoint,
            target_id: "ep-1".to_string(),
            priority: 90,
            bucket: qforge_core::PriorityBucket::Critical,
            reason: String::new(),
        };
        assert_ne!(
            intent_key(&intent(qforge_core::IntentLevel::Api)),
            intent_key(&intent(qforge_core::IntentLevel::E2e))
        );
    }

    #[test]
    fn test_scan_repository_skips_vendored_trees() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::create_dir_all(dir.path().join("vendor/dep")).unwrap();
        std::fs::write(
            dir.path().join("pkg/math.go"),
            "package pkg\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("vendor/dep/dep.go"),
            "package dep\n\nfunc Hidden() {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "# ignored").unwrap();

        let files = scan_repository(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "pkg/math.go");
        assert_eq!(files[0].functions[0].name, "Add");
    }

    #[test]
    fn test_scan_survives_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.go"), "package ok\n\nfunc Fine() {}\n").unwrap();
        // invalid utf-8 forces a read failure path
        std::fs::write(dir.path().join("bad.go"), [0xff, 0xfe, 0x00]).unwrap();

        let files = scan_repository(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "ok.go");
    }
}
