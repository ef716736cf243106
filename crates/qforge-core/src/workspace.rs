//! Workspace state: the resumable, checkpointed record of one pipeline run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phase of a workspace run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspacePhase {
    Init,
    Planning,
    Generating,
    Validating,
    Scoring,
    Complete,
    Paused,
    Failed,
}

/// Per-target processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Progress record for a single planned target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub id: String,
    pub status: TargetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Complete checkpointable state of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub id: String,
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub language: String,
    pub path: String,
    pub phase: WorkspacePhase,
    pub total_targets: u64,
    pub completed_targets: u64,
    pub failed_targets: u64,
    pub targets: Vec<TargetState>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl WorkspaceState {
    pub fn new(name: &str, repo_url: &str, branch: &str, language: &str, path: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
            language: language.to_string(),
            path: path.to_string(),
            phase: WorkspacePhase::Init,
            total_targets: 0,
            completed_targets: 0,
            failed_targets: 0,
            targets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target_mut(&mut self, id: &str) -> Option<&mut TargetState> {
        self.targets.iter_mut().find(|t| t.id == id)
    }

    /// Targets still owed work, in original plan order
    pub fn remaining_targets(&self) -> Vec<&TargetState> {
        self.targets
            .iter()
            .filter(|t| matches!(t.status, TargetStatus::Pending | TargetStatus::InProgress))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, WorkspacePhase::Complete | WorkspacePhase::Failed)
    }
}
