//! # Workspace Storage
//!
//! On-disk layout for one pipeline run:
//!
//! ```text
//! <workspaces_root>/<id>/
//!   state.json             checkpointed state, atomic rename on write
//!   model.json             system model snapshot
//!   plan.json              test plan snapshot
//!   artifacts/
//!     specs.json
//!     tests/<relative path from repo>
//!     coverage.json
//!     mutation.json
//!     quality.json
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use qforge_core::{
    CoverageReport, MutationResult, QForgeError, QResult, QualityScore, SpecSet, SystemModel,
    TestPlan, WorkspaceState,
};

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    pub state: WorkspaceState,
}

impl Workspace {
    /// Create the directory tree for a new run and write the first
    /// checkpoint.
    pub async fn create(workspaces_root: &Path, state: WorkspaceState) -> QResult<Self> {
        let root = workspaces_root.join(&state.id);
        tokio::fs::create_dir_all(root.join("artifacts/tests"))
            .await
            .map_err(|e| QForgeError::Checkpoint {
                path: root.display().to_string(),
                reason: format!("workspace directory inaccessible: {e}"),
            })?;

        let workspace = Self { root, state };
        workspace.checkpoint().await?;
        Ok(workspace)
    }

    /// Reload a checkpointed run from disk
    pub async fn load(dir: &Path) -> QResult<Self> {
        let state_path = dir.join("state.json");
        let bytes = tokio::fs::read(&state_path).await.map_err(|e| QForgeError::Input {
            reason: format!("cannot read {}: {e}", state_path.display()),
        })?;
        let state: WorkspaceState = serde_json::from_slice(&bytes)?;
        Ok(Self {
            root: dir.to_path_buf(),
            state,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("artifacts/tests")
    }

    /// Persist the current state. The write goes to a temp file first and
    /// is renamed into place so a crash never leaves a torn checkpoint.
    pub async fn checkpoint(&self) -> QResult<()> {
        let mut state = self.state.clone();
        state.updated_at = chrono::Utc::now();

        let path = self.root.join("state.json");
        let tmp = self.root.join("state.json.tmp");

        let bytes = serde_json::to_vec_pretty(&state)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| QForgeError::Checkpoint {
                path: tmp.display().to_string(),
                reason: e.to_string(),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| QForgeError::Checkpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), "state checkpointed");
        Ok(())
    }

    pub async fn write_model(&self, model: &SystemModel) -> QResult<()> {
        self.write_json(self.root.join("model.json"), model).await
    }

    pub async fn load_model(&self) -> QResult<SystemModel> {
        let bytes = tokio::fs::read(self.root.join("model.json")).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_plan(&self, plan: &TestPlan) -> QResult<()> {
        self.write_json(self.root.join("plan.json"), plan).await
    }

    pub async fn load_plan(&self) -> QResult<TestPlan> {
        let bytes = tokio::fs::read(self.root.join("plan.json")).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_specs(&self, specs: &SpecSet) -> QResult<()> {
        self.write_json(self.root.join("artifacts/specs.json"), specs).await
    }

    pub async fn write_coverage(&self, report: &CoverageReport) -> QResult<()> {
        self.write_json(self.root.join("artifacts/coverage.json"), report).await
    }

    pub async fn write_mutation(&self, result: &MutationResult) -> QResult<()> {
        self.write_json(self.root.join("artifacts/mutation.json"), result).await
    }

    pub async fn write_quality(&self, score: &QualityScore) -> QResult<()> {
        self.write_json(self.root.join("artifacts/quality.json"), score).await
    }

    /// Write an emitted test under `artifacts/tests/<relative path>`
    pub async fn write_test_file(&self, relative: &Path, source: &str) -> QResult<PathBuf> {
        let path = self.tests_dir().join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, source).await?;
        Ok(path)
    }

    async fn write_json<T: Serialize>(&self, path: PathBuf, value: &T) -> QResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| QForgeError::Checkpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Framework detection markers: `go.mod` wins, then `package.json`, then
/// the python manifests; absence falls back to go.
pub fn detect_repo_language(repo: &Path) -> &'static str {
    if repo.join("go.mod").exists() {
        return "go";
    }
    if repo.join("package.json").exists() {
        return "javascript";
    }
    if repo.join("requirements.txt").exists()
        || repo.join("pyproject.toml").exists()
        || repo.join("setup.py").exists()
    {
        return "python";
    }
    "go"
}

#[cfg(test)]
mod tests {
    use super::*;
    use qforge_core::{TargetState, TargetStatus, WorkspacePhase};

    fn state() -> WorkspaceState {
        WorkspaceState::new("demo", "https://example.com/r.git", "main", "go", "/tmp/repo")
    }

    #[tokio::test]
    async fn test_create_checkpoint_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::create(dir.path(), state()).await.unwrap();

        workspace.state.phase = WorkspacePhase::Generating;
        workspace.state.targets.push(TargetState {
            id: "t1".to_string(),
            status: TargetStatus::Completed,
            test_file: Some("artifacts/tests/add_test.go".to_string()),
            last_error: None,
        });
        workspace.checkpoint().await.unwrap();

        let reloaded = Workspace::load(workspace.dir()).await.unwrap();
        assert_eq!(reloaded.state.phase, WorkspacePhase::Generating);
        assert_eq!(reloaded.state.targets.len(), 1);
        assert_eq!(reloaded.state.id, workspace.state.id);

        // the tmp file never survives a completed checkpoint
        assert!(!workspace.dir().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_test_file_creates_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(dir.path(), state()).await.unwrap();

        let path = workspace
            .write_test_file(Path::new("pkg/mathutil/add_test.go"), "package mathutil\n")
            .await
            .unwrap();
        assert!(path.exists());
        assert!(path.ends_with("artifacts/tests/pkg/mathutil/add_test.go"));
    }

    #[tokio::test]
    async fn test_detect_repo_language_markers() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_repo_language(dir.path()), "go");

        std::fs::write(dir.path().join("requirements.txt"), "").unwrap();
        assert_eq!(detect_repo_language(dir.path()), "python");

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_repo_language(dir.path()), "javascript");

        std::fs::write(dir.path().join("go.mod"), "module demo\n").unwrap();
        assert_eq!(detect_repo_language(dir.path()), "go");
    }

    #[tokio::test]
    async fn test_load_missing_workspace_is_input_error() {
        let err = Workspace::load(Path::new("/nonexistent/ws")).await.unwrap_err();
        assert!(matches!(err, QForgeError::Input { .. }));
    }
}
