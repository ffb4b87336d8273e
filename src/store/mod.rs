//! Stage state storage
//!
//! The store is the only shared mutable resource in the engine. Reads hand
//! out consistent snapshots; every mutation bumps a per-project version, so
//! gate decisions evaluated against an older graph are rejected at commit
//! time instead of silently committing against changed state.

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{Stage, TransitionRecord};

pub use file::FileStore;
pub use memory::InMemoryStore;

/// Identity of a provisioned project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ProjectMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Consistent point-in-time view of a project's stages.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub stages: Vec<Stage>,
    /// Monotonic counter bumped by every mutation of the project.
    pub version: u64,
}

/// Storage backend for stages and transition history.
///
/// Implementations must make `apply_transition` atomic (both stages and the
/// record land together, or nothing does) and must reject it when
/// `expected_version` no longer matches; that compare-and-swap is what turns
/// two racing commits into one winner and one `ConcurrentTransitionConflict`.
pub trait StageStore: Send + Sync {
    fn init_project(&self, meta: ProjectMeta) -> Result<(), EngineError>;

    fn project_meta(&self, project_id: &str) -> Result<ProjectMeta, EngineError>;

    fn snapshot(&self, project_id: &str) -> Result<GraphSnapshot, EngineError>;

    fn insert_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError>;

    /// Replace a stage wholesale, bumping the project version.
    fn update_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError>;

    /// Delete a stage. Refuses while any history record references it.
    fn remove_stage(&self, project_id: &str, stage_id: &str) -> Result<(), EngineError>;

    /// Atomically commit a transition: replace both stages and append the
    /// record, iff the project version still equals `expected_version`.
    fn apply_transition(
        &self,
        project_id: &str,
        expected_version: u64,
        from: Stage,
        to: Stage,
        record: TransitionRecord,
    ) -> Result<(), EngineError>;

    fn history(&self, project_id: &str) -> Result<Vec<TransitionRecord>, EngineError>;
}
