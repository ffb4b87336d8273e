//! Immutable transition history records
//!
//! Records are created only by the transition executor on successful commit
//! and form an append-only audit trail. They are never mutated or deleted;
//! stage deletion cascade-checks against them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::ConditionResult;

/// Direction of a committed transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    /// Normal forward move to the next stage.
    Advance,
    /// Explicitly-authorized backward move to the previous stage.
    Regression,
}

/// Explicit sign-off carried by a regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub authorized_by: String,
    pub reason: String,
}

/// One committed transition, with the condition results frozen at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub project_id: String,
    pub from_stage_id: String,
    pub to_stage_id: String,
    pub kind: TransitionKind,
    pub committed_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Gate decision this commit was authorized by. None for regressions,
    /// which are authorized by a person instead.
    #[serde(default)]
    pub decision_id: Option<Uuid>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
    /// Snapshot of the condition results at commit time.
    #[serde(default)]
    pub conditions: Vec<ConditionResult>,
}

impl TransitionRecord {
    pub fn advance(
        project_id: impl Into<String>,
        from_stage_id: impl Into<String>,
        to_stage_id: impl Into<String>,
        decision_id: Uuid,
        conditions: Vec<ConditionResult>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            from_stage_id: from_stage_id.into(),
            to_stage_id: to_stage_id.into(),
            kind: TransitionKind::Advance,
            committed_at: Utc::now(),
            notes,
            decision_id: Some(decision_id),
            authorization: None,
            conditions,
        }
    }

    pub fn regression(
        project_id: impl Into<String>,
        from_stage_id: impl Into<String>,
        to_stage_id: impl Into<String>,
        authorization: Authorization,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            from_stage_id: from_stage_id.into(),
            to_stage_id: to_stage_id.into(),
            kind: TransitionKind::Regression,
            committed_at: Utc::now(),
            notes,
            decision_id: None,
            authorization: Some(authorization),
            conditions: Vec::new(),
        }
    }

    /// True if the record references the given stage on either side.
    pub fn references_stage(&self, stage_id: &str) -> bool {
        self.from_stage_id == stage_id || self.to_stage_id == stage_id
    }
}
