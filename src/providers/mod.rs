//! Injected collaborator interfaces
//!
//! Condition evaluators never query task, quality, approval, or document
//! subsystems directly; they go through these traits, each a single read
//! query keyed by `(project_id, stage_id)`. Hosts inject real integrations;
//! the `facts` module supplies file-backed implementations for the CLI and
//! for tests.

pub mod facts;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Stage;

pub use facts::{
    ApprovalFact, DocumentFact, QualityIssueFact, SharedFacts, TaskFact, WorkspaceFacts,
};

/// A collaborator that could not answer. Evaluation treats this as
/// indeterminate, never as a passed or failed check.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Read query against the task-tracking subsystem.
pub trait TaskStatusProvider: Send + Sync {
    /// Names of required tasks for the stage that are not yet completed.
    fn outstanding_tasks(
        &self,
        project_id: &str,
        stage_id: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Read query against the quality-control subsystem.
pub trait QualityIssueProvider: Send + Sync {
    /// Number of open quality issues for the stage's samples.
    fn open_issues(&self, project_id: &str, stage_id: &str) -> Result<usize, ProviderError>;
}

/// Sign-off state reported by the approval subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    Approved {
        approver: String,
        at: DateTime<Utc>,
    },
    Pending {
        approver: String,
    },
}

/// Read query against the approval-record subsystem.
pub trait ApprovalProvider: Send + Sync {
    fn approval(&self, project_id: &str, stage_id: &str) -> Result<ApprovalState, ProviderError>;
}

/// Existence and review state of one deliverable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    pub name: String,
    pub exists: bool,
    pub reviewed: bool,
}

impl DocumentState {
    pub fn is_accepted(&self) -> bool {
        self.exists && self.reviewed
    }
}

/// Read query against the document store.
pub trait DocumentStatusProvider: Send + Sync {
    fn document(
        &self,
        project_id: &str,
        stage_id: &str,
        name: &str,
    ) -> Result<DocumentState, ProviderError>;
}

/// Verdict of a custom check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Caller-supplied predicate backing a `Custom` condition. The engine treats
/// the check as opaque; it must be read-only on domain state.
pub trait CustomCheck: Send + Sync {
    fn run(
        &self,
        project_id: &str,
        from_stage: &Stage,
        to_stage: &Stage,
    ) -> Result<CheckOutcome, ProviderError>;
}
