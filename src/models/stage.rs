use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub project_id: String,
    /// Position in the project's lifecycle. Positive and unique per project.
    pub order: u32,
    pub name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub estimated_duration_days: Option<u32>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a stage in the project lifecycle.
///
/// State machine transitions:
/// - `NotStarted` → `InProgress` (stage entered via commit or project start)
/// - `InProgress` → `Completed` (transition committed past this stage)
/// - `InProgress` → `Blocked` (external event marks the stage stalled)
/// - `Blocked` → `InProgress` (stage unblocked)
/// - `Completed` is a terminal state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not been entered yet.
    #[serde(rename = "not-started")]
    NotStarted,

    /// Stage is the one currently being worked. At most one per project.
    #[serde(rename = "in-progress")]
    InProgress,

    /// Stage work is done; terminal state.
    #[serde(rename = "completed")]
    Completed,

    /// Stage is stalled pending intervention. Recoverable back to InProgress.
    #[serde(rename = "blocked")]
    Blocked,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::NotStarted => write!(f, "NotStarted"),
            StageStatus::InProgress => write!(f, "InProgress"),
            StageStatus::Completed => write!(f, "Completed"),
            StageStatus::Blocked => write!(f, "Blocked"),
        }
    }
}

impl StageStatus {
    /// Check if transitioning from the current status to the new status is valid.
    ///
    /// Same-status transitions are treated as valid no-ops.
    pub fn can_transition_to(&self, new_status: &StageStatus) -> bool {
        if self == new_status {
            return true;
        }

        match self {
            StageStatus::NotStarted => matches!(new_status, StageStatus::InProgress),
            StageStatus::InProgress => {
                matches!(new_status, StageStatus::Completed | StageStatus::Blocked)
            }
            StageStatus::Blocked => matches!(new_status, StageStatus::InProgress),
            StageStatus::Completed => false, // Terminal state
        }
    }

    /// Attempt to transition to a new status, returning an error if invalid.
    pub fn try_transition(&self, new_status: StageStatus) -> Result<StageStatus, EngineError> {
        if self.can_transition_to(&new_status) {
            Ok(new_status)
        } else {
            Err(EngineError::InvalidStageTransition {
                from: self.to_string(),
                to: new_status.to_string(),
            })
        }
    }

    /// Returns the list of valid statuses this status can transition to.
    pub fn valid_transitions(&self) -> Vec<StageStatus> {
        match self {
            StageStatus::NotStarted => vec![StageStatus::InProgress],
            StageStatus::InProgress => vec![StageStatus::Completed, StageStatus::Blocked],
            StageStatus::Blocked => vec![StageStatus::InProgress],
            StageStatus::Completed => vec![], // Terminal state
        }
    }

    /// Whether this status ends the stage's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }
}

impl Stage {
    pub fn new(project_id: impl Into<String>, id: impl Into<String>, order: u32, name: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            project_id: project_id.into(),
            order,
            name: name.into(),
            status: StageStatus::NotStarted,
            estimated_duration_days: None,
            start_date: None,
            end_date: None,
            prerequisites: BTreeSet::new(),
            deliverables: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_estimated_duration(mut self, days: u32) -> Self {
        self.estimated_duration_days = Some(days);
        self
    }

    pub fn add_prerequisite(&mut self, prerequisite: String) {
        if self.prerequisites.insert(prerequisite) {
            self.updated_at = Utc::now();
        }
    }

    pub fn add_deliverable(&mut self, deliverable: String) {
        if !self.deliverables.contains(&deliverable) {
            self.deliverables.push(deliverable);
            self.updated_at = Utc::now();
        }
    }

    pub fn rename(&mut self, name: String) {
        self.name = name;
        self.updated_at = Utc::now();
    }

    pub fn set_estimated_duration(&mut self, days: Option<u32>) {
        self.estimated_duration_days = days;
        self.updated_at = Utc::now();
    }

    /// Attempt to transition the stage to a new status with validation.
    ///
    /// This is the only supported path for changing stage status; metadata
    /// edit operations cannot touch it.
    pub fn try_transition(&mut self, new_status: StageStatus) -> Result<(), EngineError> {
        let validated_status = self.status.try_transition(new_status)?;
        self.status = validated_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter the stage: NotStarted -> InProgress, stamping the start date
    /// if it was never set.
    pub fn try_start(&mut self) -> Result<(), EngineError> {
        self.try_transition(StageStatus::InProgress)?;
        if self.start_date.is_none() {
            self.start_date = Some(Utc::now());
        }
        Ok(())
    }

    /// Close the stage: InProgress -> Completed, stamping the end date
    /// if it was never set.
    pub fn try_complete(&mut self) -> Result<(), EngineError> {
        self.try_transition(StageStatus::Completed)?;
        if self.end_date.is_none() {
            self.end_date = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the stage stalled: InProgress -> Blocked.
    pub fn try_mark_blocked(&mut self) -> Result<(), EngineError> {
        self.try_transition(StageStatus::Blocked)
    }

    /// Recover a stalled stage: Blocked -> InProgress.
    pub fn try_unblock(&mut self) -> Result<(), EngineError> {
        self.try_transition(StageStatus::InProgress)
    }

    /// Reopen a completed stage for rework. Bypasses the forward-only state
    /// machine; reachable only through the executor's authorized regression.
    pub(crate) fn reopen(&mut self) {
        self.status = StageStatus::InProgress;
        self.end_date = None;
        self.updated_at = Utc::now();
    }

    /// Reset an active stage back to NotStarted. Bypasses the forward-only
    /// state machine; reachable only through the executor's authorized
    /// regression.
    pub(crate) fn reset(&mut self) {
        self.status = StageStatus::NotStarted;
        self.start_date = None;
        self.end_date = None;
        self.updated_at = Utc::now();
    }
}
