//! Per-edge condition bindings
//!
//! The set of conditions guarding each (from, to) edge is static
//! configuration, defined when a project is provisioned from a template and
//! looked up on every gate evaluation.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::TransitionCondition;

/// Conditions bound to one edge of one project's stage graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConditions {
    pub project_id: String,
    pub from_stage_id: String,
    pub to_stage_id: String,
    pub conditions: Vec<TransitionCondition>,
}

/// Lookup table from (project, from, to) edges to their condition sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionRegistry {
    edges: Vec<EdgeConditions>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a condition set to an edge, replacing any previous binding.
    ///
    /// Rejects duplicate condition ids within the set: a condition id must
    /// identify exactly one check on its edge.
    pub fn bind(
        &mut self,
        project_id: impl Into<String>,
        from_stage_id: impl Into<String>,
        to_stage_id: impl Into<String>,
        conditions: Vec<TransitionCondition>,
    ) -> Result<(), EngineError> {
        let project_id = project_id.into();
        let from_stage_id = from_stage_id.into();
        let to_stage_id = to_stage_id.into();

        for (i, condition) in conditions.iter().enumerate() {
            if conditions[..i].iter().any(|c| c.id == condition.id) {
                return Err(EngineError::InvalidTemplate(format!(
                    "condition id '{}' bound twice on edge '{}' -> '{}'",
                    condition.id, from_stage_id, to_stage_id
                )));
            }
        }

        self.edges.retain(|e| {
            !(e.project_id == project_id
                && e.from_stage_id == from_stage_id
                && e.to_stage_id == to_stage_id)
        });
        self.edges.push(EdgeConditions {
            project_id,
            from_stage_id,
            to_stage_id,
            conditions,
        });
        Ok(())
    }

    /// Conditions guarding the given edge, in their configured order.
    /// An unbound edge has an empty condition set.
    pub fn conditions_for(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
    ) -> Vec<TransitionCondition> {
        self.edges
            .iter()
            .find(|e| {
                e.project_id == project_id
                    && e.from_stage_id == from_stage_id
                    && e.to_stage_id == to_stage_id
            })
            .map(|e| e.conditions.clone())
            .unwrap_or_default()
    }

    /// Find one condition on an edge by id.
    pub fn condition(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
        condition_id: &str,
    ) -> Result<TransitionCondition, EngineError> {
        self.conditions_for(project_id, from_stage_id, to_stage_id)
            .into_iter()
            .find(|c| c.id == condition_id)
            .ok_or_else(|| EngineError::ConditionNotFound {
                condition_id: condition_id.to_string(),
                from: from_stage_id.to_string(),
                to: to_stage_id.to_string(),
            })
    }

    pub fn edges(&self) -> &[EdgeConditions] {
        &self.edges
    }
}
