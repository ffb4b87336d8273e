//! Ordered stage sequence for a project
//!
//! This module handles:
//! - Structural queries (current stage, next/previous stage)
//! - Edge validation for the sequential-only transition policy
//! - Order-uniqueness and single-active-stage invariant checks
//!
//! A graph is always built from a consistent store snapshot and passed
//! explicitly into engine calls; there is no hidden shared state.

use crate::error::EngineError;
use crate::models::{ProjectStatus, Stage, StageStatus};

/// Immutable view over a project's stages, sorted by order.
#[derive(Debug, Clone)]
pub struct StageGraph {
    project_id: String,
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Build a graph from a stage snapshot, validating structural invariants:
    /// orders are positive and unique, and at most one stage is active
    /// (InProgress or Blocked).
    pub fn new(project_id: impl Into<String>, mut stages: Vec<Stage>) -> Result<Self, EngineError> {
        let project_id = project_id.into();
        stages.sort_by_key(|s| s.order);

        for pair in stages.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(EngineError::DuplicateStageOrder {
                    project_id,
                    order: pair[0].order,
                });
            }
        }
        if let Some(stage) = stages.iter().find(|s| s.order == 0) {
            return Err(EngineError::GraphInvariantViolated {
                project_id,
                detail: format!("stage '{}' has order 0; orders start at 1", stage.id),
            });
        }

        let active = stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::InProgress | StageStatus::Blocked))
            .count();
        if active > 1 {
            return Err(EngineError::GraphInvariantViolated {
                project_id,
                detail: format!("{active} stages are simultaneously active"),
            });
        }

        Ok(Self { project_id, stages })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, stage_id: &str) -> Result<&Stage, EngineError> {
        self.stages
            .iter()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| EngineError::StageNotFound {
                project_id: self.project_id.clone(),
                stage_id: stage_id.to_string(),
            })
    }

    /// The stage the project is currently at.
    ///
    /// Resolution order: the unique InProgress stage, else the stalled
    /// (Blocked) stage, else the lowest-order NotStarted stage, else the
    /// final stage once every stage is terminal. Fails with
    /// `NoStagesDefined` for a project without stages.
    pub fn current_stage(&self) -> Result<&Stage, EngineError> {
        if self.stages.is_empty() {
            return Err(EngineError::NoStagesDefined(self.project_id.clone()));
        }

        if let Some(stage) = self
            .stages
            .iter()
            .find(|s| s.status == StageStatus::InProgress)
        {
            return Ok(stage);
        }
        if let Some(stage) = self.stages.iter().find(|s| s.status == StageStatus::Blocked) {
            return Ok(stage);
        }
        if let Some(stage) = self
            .stages
            .iter()
            .find(|s| s.status == StageStatus::NotStarted)
        {
            return Ok(stage);
        }

        // All stages terminal: the project sits at its final stage.
        self.stages
            .last()
            .ok_or_else(|| EngineError::NoStagesDefined(self.project_id.clone()))
    }

    /// The stage with `order + 1`, or None if `stage_id` is the terminal stage.
    pub fn next_stage(&self, stage_id: &str) -> Result<Option<&Stage>, EngineError> {
        let stage = self.stage(stage_id)?;
        Ok(self.stages.iter().find(|s| s.order == stage.order + 1))
    }

    /// The stage with `order - 1`, or None if `stage_id` is the first stage.
    pub fn previous_stage(&self, stage_id: &str) -> Result<Option<&Stage>, EngineError> {
        let stage = self.stage(stage_id)?;
        if stage.order == 1 {
            return Ok(None);
        }
        Ok(self.stages.iter().find(|s| s.order == stage.order - 1))
    }

    /// Enforce the sequential-only policy: `to` must immediately follow
    /// `from`. Non-sequential jumps are rejected with `InvalidEdge`; there is
    /// no override path through this check.
    pub fn validate_edge(&self, from_id: &str, to_id: &str) -> Result<(), EngineError> {
        let from = self.stage(from_id)?;
        let to = self.stage(to_id)?;

        if to.order != from.order + 1 {
            return Err(EngineError::InvalidEdge {
                from: from.id.clone(),
                from_order: from.order,
                to: to.id.clone(),
                to_order: to.order,
            });
        }

        Ok(())
    }

    pub fn project_status(&self) -> ProjectStatus {
        ProjectStatus::derive(&self.stages)
    }
}
