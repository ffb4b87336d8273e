//! Engine error taxonomy
//!
//! Only structural errors and commit-time conflicts abort a call. Failures of
//! individual condition checks are never raised through this type; they are
//! captured per-condition inside the gate decision, so callers can tell
//! "blocked by unmet conditions" apart from "the engine refused the request".

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested transition does not respect the sequential stage ordering.
    #[error(
        "invalid edge: '{from}' (order {from_order}) -> '{to}' (order {to_order}) skips the sequence"
    )]
    InvalidEdge {
        from: String,
        from_order: u32,
        to: String,
        to_order: u32,
    },

    #[error("project '{0}' has no stages defined")]
    NoStagesDefined(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("stage '{stage_id}' not found in project '{project_id}'")]
    StageNotFound {
        project_id: String,
        stage_id: String,
    },

    #[error("condition '{condition_id}' is not bound to edge '{from}' -> '{to}'")]
    ConditionNotFound {
        condition_id: String,
        from: String,
        to: String,
    },

    #[error("duplicate stage order {order} in project '{project_id}'")]
    DuplicateStageOrder { project_id: String, order: u32 },

    #[error("stage graph for project '{project_id}' violates an invariant: {detail}")]
    GraphInvariantViolated { project_id: String, detail: String },

    #[error("invalid stage status transition: {from} -> {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("stage '{stage_id}' is referenced by {records} history record(s) and cannot be deleted")]
    StageReferencedByHistory { stage_id: String, records: usize },

    #[error("stage '{stage_id}' has no previous stage to regress to")]
    NoPreviousStage { stage_id: String },

    #[error("gate decision {decision_id} is not admissible and cannot be committed")]
    InadmissibleDecision { decision_id: Uuid },

    #[error("gate decision {decision_id} is stale: {reason}")]
    StaleDecision { decision_id: Uuid, reason: String },

    #[error(
        "concurrent transition conflict on project '{project_id}': \
         graph version moved from {expected} to {actual}"
    )]
    ConcurrentTransitionConflict {
        project_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("evaluation cancelled by caller")]
    EvaluationCancelled,

    #[error("invalid workflow template: {0}")]
    InvalidTemplate(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Wrap an underlying I/O or serialization failure from a store backend.
    pub fn store(err: impl std::fmt::Display) -> Self {
        EngineError::Store(err.to_string())
    }
}
