//! End-to-end pipeline scenarios against a scripted completion backend
//! and a stub process executor, so everything runs hermetically.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use qforge_core::{QResult, TargetStatus, WorkspacePhase, WorkspaceState};
use qforge_engine::process::ExecOutput;
use qforge_engine::{
    detect_repo_language, ProcessExecutor, RunnerCallbacks, RunnerConfig, Workspace,
    WorkspaceRunner,
};
use qforge_llm::{
    BudgetLimits, CompletionBackend, InMemoryCache, LlmRouter, RouterConfig, ScriptedBackend,
    UsageTracker,
};

const ADD_SPEC_JSON: &str = r#"{
    "specs": [{
        "name": "adds two numbers",
        "given": [
            {"name": "a", "type_hint": "int", "value": 2},
            {"name": "b", "type_hint": "int", "value": 3}
        ],
        "when": {"symbol": "Add", "arguments": ["$a", "$b"]},
        "then": [{"actual": "result", "type": "equals", "expected": 5}],
        "tags": ["happy_path"]
    }]
}"#;

/// Executor whose every invocation reports success
struct PassingExecutor;

#[async_trait]
impl ProcessExecutor for PassingExecutor {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        _workdir: &Path,
        _program: &str,
        _args: &[String],
        _timeout: Duration,
    ) -> QResult<ExecOutput> {
        Ok(ExecOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

fn scripted_router(backend: &Arc<ScriptedBackend>) -> Arc<LlmRouter> {
    Arc::new(LlmRouter::new(
        vec![Arc::clone(backend) as Arc<dyn CompletionBackend>],
        Arc::new(InMemoryCache::new(64)),
        Arc::new(UsageTracker::new(BudgetLimits::default())),
        RouterConfig::default(),
    ))
}

fn go_fixture_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("go.mod"), "module example.com/mathutil\n\ngo 1.21\n").unwrap();
    std::fs::create_dir_all(dir.path().join("mathutil")).unwrap();
    std::fs::write(
        dir.path().join("mathutil/math.go"),
        r#"package mathutil

func Add(a, b int) int {
	return a + b
}

func IsEven(n int) bool {
	return n%2 == 0
}
"#,
    )
    .unwrap();
    dir
}

async fn runner_for(
    repo: &Path,
    workspaces: &Path,
    backend: &Arc<ScriptedBackend>,
    config: RunnerConfig,
    callbacks: RunnerCallbacks,
) -> WorkspaceRunner {
    let language = detect_repo_language(repo);
    let state = WorkspaceState::new(
        "it-run",
        "https://example.com/demo.git",
        "main",
        language,
        &repo.display().to_string(),
    );
    let workspace = Workspace::create(workspaces, state).await.unwrap();
    WorkspaceRunner::new(
        workspace,
        repo.to_path_buf(),
        scripted_router(backend),
        Arc::new(PassingExecutor),
        config,
        Default::default(),
        callbacks,
    )
}

#[tokio::test]
async fn test_go_fixture_end_to_end() {
    let repo = go_fixture_repo();
    let workspaces = tempfile::tempdir().unwrap();

    let backend = Arc::new(ScriptedBackend::new("stub").with_fallback(ADD_SPEC_JSON));
    let config = RunnerConfig {
        validate_tests: false,
        run_quality: false,
        ..Default::default()
    };

    let completed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&completed);
    let callbacks = RunnerCallbacks {
        on_progress: Some(Arc::new(move |event| {
            if event.status == TargetStatus::Completed {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })),
        ..Default::default()
    };

    let runner = runner_for(repo.path(), workspaces.path(), &backend, config, callbacks).await;
    let state = runner.run(&CancellationToken::new()).await.unwrap();

    // two unit intents: Add (60) and IsEven (55)
    assert_eq!(state.phase, WorkspacePhase::Complete);
    assert_eq!(state.total_targets, 2);
    assert_eq!(state.completed_targets, 2);
    assert_eq!(state.failed_targets, 0);
    assert_eq!(completed.load(Ordering::SeqCst), 2);

    // the emitted artifact contains the inlined call and expectation
    let emitted = std::fs::read_to_string(repo.path().join("mathutil/add_test.go")).unwrap();
    assert!(emitted.contains("Add(2, 3)"));
    assert!(emitted.contains("5"));
    assert!(emitted.contains("package mathutil"));

    // workspace artifacts mirror the repo copy
    let ws_dir = workspaces.path().join(&state.id);
    assert!(ws_dir.join("state.json").exists());
    assert!(ws_dir.join("model.json").exists());
    assert!(ws_dir.join("plan.json").exists());
    assert!(ws_dir.join("artifacts/specs.json").exists());
    assert!(ws_dir
        .join("artifacts/tests/mathutil/add_test.go")
        .exists());
}

#[tokio::test]
async fn test_empty_repository_completes_with_zero_targets() {
    let repo = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();

    let backend = Arc::new(ScriptedBackend::new("stub"));
    let runner = runner_for(
        repo.path(),
        workspaces.path(),
        &backend,
        RunnerConfig::default(),
        RunnerCallbacks::default(),
    )
    .await;

    let state = runner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(state.phase, WorkspacePhase::Complete);
    assert_eq!(state.total_targets, 0);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_resume_processes_only_remaining_targets() {
    let repo = go_fixture_repo();
    let workspaces = tempfile::tempdir().unwrap();

    let config = RunnerConfig {
        validate_tests: false,
        run_quality: false,
        ..Default::default()
    };

    // first run completes everything
    let backend = Arc::new(ScriptedBackend::new("stub").with_fallback(ADD_SPEC_JSON));
    let runner = runner_for(
        repo.path(),
        workspaces.path(),
        &backend,
        config.clone(),
        RunnerCallbacks::default(),
    )
    .await;
    let state = runner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(backend.call_count(), 2);

    // rewind one target to pending, as if the process had crashed there
    let ws_dir = workspaces.path().join(&state.id);
    let mut reloaded = Workspace::load(&ws_dir).await.unwrap();
    reloaded.state.phase = WorkspacePhase::Generating;
    reloaded.state.completed_targets = 1;
    reloaded.state.targets[1].status = TargetStatus::Pending;
    reloaded.checkpoint().await.unwrap();

    let resumed_backend = Arc::new(ScriptedBackend::new("stub").with_fallback(ADD_SPEC_JSON));
    let resumed = WorkspaceRunner::new(
        Workspace::load(&ws_dir).await.unwrap(),
        repo.path().to_path_buf(),
        scripted_router(&resumed_backend),
        Arc::new(PassingExecutor),
        config,
        Default::default(),
        RunnerCallbacks::default(),
    );

    let final_state = resumed.run(&CancellationToken::new()).await.unwrap();

    // exactly the one remaining target was regenerated
    assert_eq!(resumed_backend.call_count(), 1);
    assert_eq!(final_state.phase, WorkspacePhase::Complete);
    assert_eq!(final_state.completed_targets, 2);
    assert!(final_state
        .targets
        .iter()
        .all(|t| t.status == TargetStatus::Completed));
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let repo = go_fixture_repo();
    let workspaces = tempfile::tempdir().unwrap();

    let backend = Arc::new(ScriptedBackend::new("stub").with_fallback(ADD_SPEC_JSON));
    let runner = runner_for(
        repo.path(),
        workspaces.path(),
        &backend,
        RunnerConfig {
            validate_tests: false,
            run_quality: false,
            ..Default::default()
        },
        RunnerCallbacks::default(),
    )
    .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = runner.run(&cancel).await.unwrap_err();
    assert!(matches!(err, qforge_core::QForgeError::Cancelled));
}

#[tokio::test]
async fn test_failed_generation_is_counted_not_fatal() {
    let repo = go_fixture_repo();
    let workspaces = tempfile::tempdir().unwrap();

    // every completion is unparseable, so both targets fail after the
    // self-repair round
    let backend = Arc::new(ScriptedBackend::new("stub").with_fallback("not json at all"));
    let errors = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&errors);

    let runner = runner_for(
        repo.path(),
        workspaces.path(),
        &backend,
        RunnerConfig {
            validate_tests: false,
            run_quality: false,
            ..Default::default()
        },
        RunnerCallbacks {
            on_error: Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        },
    )
    .await;

    let state = runner.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(state.phase, WorkspacePhase::Complete);
    assert_eq!(state.completed_targets, 0);
    assert_eq!(state.failed_targets, 2);
    assert_eq!(errors.load(Ordering::SeqCst), 2);
    assert!(state
        .targets
        .iter()
        .all(|t| t.status == TargetStatus::Failed && t.last_error.is_some()));
}
