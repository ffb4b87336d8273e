//! Project-level status, derived from stage states

use serde::{Deserialize, Serialize};

use super::stage::{Stage, StageStatus};

/// Aggregate status of a project. Never stored; always derived from the
/// current stage snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    Blocked,
    Completed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::NotStarted => write!(f, "NotStarted"),
            ProjectStatus::InProgress => write!(f, "InProgress"),
            ProjectStatus::Blocked => write!(f, "Blocked"),
            ProjectStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl ProjectStatus {
    /// Derive the project status from its stages.
    ///
    /// A project is in progress while any stage is, blocked while its active
    /// stage is stalled, and completed once the terminal stage is completed.
    /// A partially-advanced project with nothing currently active (e.g. right
    /// after a regression reset) still counts as in progress.
    pub fn derive(stages: &[Stage]) -> ProjectStatus {
        if stages.is_empty() {
            return ProjectStatus::NotStarted;
        }

        if stages.iter().any(|s| s.status == StageStatus::InProgress) {
            return ProjectStatus::InProgress;
        }
        if stages.iter().any(|s| s.status == StageStatus::Blocked) {
            return ProjectStatus::Blocked;
        }
        if stages.iter().all(|s| s.status == StageStatus::NotStarted) {
            return ProjectStatus::NotStarted;
        }

        let terminal_completed = stages
            .iter()
            .max_by_key(|s| s.order)
            .map(|s| s.status == StageStatus::Completed)
            .unwrap_or(false);

        if terminal_completed {
            ProjectStatus::Completed
        } else {
            ProjectStatus::InProgress
        }
    }
}
