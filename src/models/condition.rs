//! Transition conditions and their evaluation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of check a condition performs. Determines which evaluator handles it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionType {
    /// All required tasks for the stage are completed.
    TaskCompletion,
    /// No open quality issues for the stage's samples.
    DataQuality,
    /// A designated approver has recorded sign-off for the stage.
    Approval,
    /// All declared deliverable documents exist and are reviewed.
    Document,
    /// Delegates to a caller-registered check; opaque to the engine.
    Custom,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::TaskCompletion => write!(f, "task-completion"),
            ConditionType::DataQuality => write!(f, "data-quality"),
            ConditionType::Approval => write!(f, "approval"),
            ConditionType::Document => write!(f, "document"),
            ConditionType::Custom => write!(f, "custom"),
        }
    }
}

/// A named, typed check attached to one (from, to) edge.
///
/// Conditions are static configuration: defined when the edge is bound,
/// evaluated repeatedly, never mutated mid-evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionCondition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    /// Required conditions are necessary for admissibility; non-required
    /// conditions are advisory and report soft warnings only.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl TransitionCondition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition_type: ConditionType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            condition_type,
            required: true,
        }
    }

    pub fn advisory(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Evaluation progress of a single condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionStatus {
    Pending,
    Checking,
    Passed,
    Failed,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::Pending => write!(f, "Pending"),
            ConditionStatus::Checking => write!(f, "Checking"),
            ConditionStatus::Passed => write!(f, "Passed"),
            ConditionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of evaluating one condition at one point in time.
///
/// Transient: recomputed on every evaluation request and never persisted as
/// stage state. Snapshots survive only inside transition records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResult {
    pub condition_id: String,
    pub status: ConditionStatus,
    pub message: String,
    pub evaluated_at: DateTime<Utc>,
    /// True when the check could not run (collaborator unavailable, timeout)
    /// as opposed to a check that ran and reported an unmet condition.
    /// Callers retry indeterminate checks; they fix unmet ones.
    #[serde(default)]
    pub indeterminate: bool,
}

impl ConditionResult {
    pub fn pending(condition_id: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            status: ConditionStatus::Pending,
            message: String::new(),
            evaluated_at: Utc::now(),
            indeterminate: false,
        }
    }

    pub fn pass(condition_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            status: ConditionStatus::Passed,
            message: message.into(),
            evaluated_at: Utc::now(),
            indeterminate: false,
        }
    }

    pub fn fail(condition_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            status: ConditionStatus::Failed,
            message: message.into(),
            evaluated_at: Utc::now(),
            indeterminate: false,
        }
    }

    /// A check that could not produce a verdict. Treated as Failed for
    /// admissibility, but flagged so callers know to retry rather than fix.
    pub fn indeterminate(condition_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            status: ConditionStatus::Failed,
            message: message.into(),
            evaluated_at: Utc::now(),
            indeterminate: true,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == ConditionStatus::Passed
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ConditionStatus::Passed | ConditionStatus::Failed)
    }

    /// One-line summary for logs and CLI output.
    pub fn summary(&self) -> String {
        let status = if self.indeterminate {
            "INDETERMINATE"
        } else {
            match self.status {
                ConditionStatus::Pending => "PENDING",
                ConditionStatus::Checking => "CHECKING",
                ConditionStatus::Passed => "PASSED",
                ConditionStatus::Failed => "FAILED",
            }
        };
        format!("{} - {}: {}", status, self.condition_id, self.message)
    }
}
