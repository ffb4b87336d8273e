//! Engine facade
//!
//! Wires the store, condition registry, gate, and executor together behind
//! the inbound operations the host application consumes: stage graph
//! queries, transition evaluation, commit, provisioning, and the explicit
//! stage-state operations.

use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::EngineError;
use crate::gate::{
    EvaluateOptions, EvaluationContext, GateConfig, GateDecision, TransitionExecutor,
    TransitionGate, TransitionRequest,
};
use crate::graph::StageGraph;
use crate::models::{
    Authorization, ConditionResult, Stage, TransitionCondition, TransitionRecord,
};
use crate::registry::ConditionRegistry;
use crate::store::{ProjectMeta, StageStore};
use crate::template::WorkflowTemplate;

/// Optional edits to a stage's metadata. Fields left `None` are untouched.
/// Status is deliberately absent: it moves only through the executor.
#[derive(Debug, Clone, Default)]
pub struct StageEdit {
    pub name: Option<String>,
    pub estimated_duration_days: Option<Option<u32>>,
    pub prerequisites: Option<Vec<String>>,
    pub deliverables: Option<Vec<String>>,
}

pub struct Engine {
    store: Arc<dyn StageStore>,
    registry: Arc<RwLock<ConditionRegistry>>,
    gate: TransitionGate,
    executor: TransitionExecutor,
}

impl Engine {
    pub fn new(store: Arc<dyn StageStore>, context: EvaluationContext, config: GateConfig) -> Self {
        let registry = Arc::new(RwLock::new(ConditionRegistry::new()));
        let gate = TransitionGate::new(
            store.clone(),
            registry.clone(),
            context,
            config.clone(),
        );
        let executor = TransitionExecutor::new(store.clone(), config);
        Self {
            store,
            registry,
            gate,
            executor,
        }
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Create a project from a validated template: project metadata, its
    /// stage sequence, and the per-edge condition bindings.
    pub fn provision_project(&self, template: &WorkflowTemplate) -> Result<(), EngineError> {
        let issues = template.validate();
        if !issues.is_empty() {
            let summary: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
            return Err(EngineError::InvalidTemplate(summary.join("; ")));
        }

        self.store.init_project(ProjectMeta::new(
            template.project.id.clone(),
            template.project.name.clone(),
        ))?;
        for stage in template.build_stages() {
            self.store.insert_stage(&template.project.id, stage)?;
        }

        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        for edge in &template.conditions {
            registry.bind(
                template.project.id.clone(),
                edge.from.clone(),
                edge.to.clone(),
                edge.conditions.clone(),
            )?;
        }

        info!(project = %template.project.id, stages = template.stages.len(), "project provisioned");
        Ok(())
    }

    /// Bind (or replace) the condition set on an edge. The edge must exist
    /// and respect the sequential ordering.
    pub fn bind_conditions(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
        conditions: Vec<TransitionCondition>,
    ) -> Result<(), EngineError> {
        let graph = self.stage_graph(project_id)?;
        graph.validate_edge(from_stage_id, to_stage_id)?;

        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.bind(project_id, from_stage_id, to_stage_id, conditions)
    }

    pub fn conditions_for(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
    ) -> Vec<TransitionCondition> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.conditions_for(project_id, from_stage_id, to_stage_id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn project_meta(&self, project_id: &str) -> Result<ProjectMeta, EngineError> {
        self.store.project_meta(project_id)
    }

    /// A consistent snapshot of the project's stage graph.
    pub fn stage_graph(&self, project_id: &str) -> Result<StageGraph, EngineError> {
        let snapshot = self.store.snapshot(project_id)?;
        StageGraph::new(project_id.to_string(), snapshot.stages)
    }

    pub fn history(&self, project_id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        self.store.history(project_id)
    }

    // =========================================================================
    // Gate
    // =========================================================================

    pub fn evaluate_transition(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
    ) -> Result<GateDecision, EngineError> {
        self.gate
            .evaluate(&TransitionRequest::new(project_id, from_stage_id, to_stage_id))
    }

    pub fn evaluate_transition_with_options(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
        options: &EvaluateOptions,
    ) -> Result<GateDecision, EngineError> {
        self.gate.evaluate_with_options(
            &TransitionRequest::new(project_id, from_stage_id, to_stage_id),
            options,
        )
    }

    /// Re-run one condition of an edge.
    pub fn evaluate_condition(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
        condition_id: &str,
    ) -> Result<ConditionResult, EngineError> {
        self.gate.evaluate_condition_by_id(
            &TransitionRequest::new(project_id, from_stage_id, to_stage_id),
            condition_id,
        )
    }

    // =========================================================================
    // Executor
    // =========================================================================

    pub fn commit_transition(
        &self,
        project_id: &str,
        from_stage_id: &str,
        to_stage_id: &str,
        decision: &GateDecision,
        notes: Option<String>,
    ) -> Result<TransitionRecord, EngineError> {
        self.executor.commit(
            &TransitionRequest::new(project_id, from_stage_id, to_stage_id),
            decision,
            notes,
        )
    }

    pub fn start_project(&self, project_id: &str) -> Result<Stage, EngineError> {
        self.executor.start_project(project_id)
    }

    pub fn mark_blocked(&self, project_id: &str, stage_id: &str) -> Result<Stage, EngineError> {
        self.executor.mark_blocked(project_id, stage_id)
    }

    pub fn unblock(&self, project_id: &str, stage_id: &str) -> Result<Stage, EngineError> {
        self.executor.unblock(project_id, stage_id)
    }

    pub fn regress(
        &self,
        project_id: &str,
        authorization: Authorization,
        notes: Option<String>,
    ) -> Result<TransitionRecord, EngineError> {
        self.executor.regress(project_id, authorization, notes)
    }

    // =========================================================================
    // Stage maintenance
    // =========================================================================

    /// Apply metadata edits to a stage. Cannot touch status or order.
    pub fn edit_stage(
        &self,
        project_id: &str,
        stage_id: &str,
        edit: StageEdit,
    ) -> Result<Stage, EngineError> {
        let graph = self.stage_graph(project_id)?;
        let mut stage = graph.stage(stage_id)?.clone();

        if let Some(name) = edit.name {
            stage.rename(name);
        }
        if let Some(days) = edit.estimated_duration_days {
            stage.set_estimated_duration(days);
        }
        if let Some(prerequisites) = edit.prerequisites {
            stage.prerequisites = prerequisites.into_iter().collect();
        }
        if let Some(deliverables) = edit.deliverables {
            stage.deliverables = deliverables;
        }

        self.store.update_stage(project_id, stage.clone())?;
        Ok(stage)
    }

    /// Move a stage to a new order slot, refusing any placement that would
    /// leave two stages with the same order.
    pub fn reorder_stage(
        &self,
        project_id: &str,
        stage_id: &str,
        new_order: u32,
    ) -> Result<Stage, EngineError> {
        let graph = self.stage_graph(project_id)?;
        let mut stages: Vec<Stage> = graph.stages().to_vec();

        let stage = stages
            .iter_mut()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| EngineError::StageNotFound {
                project_id: project_id.to_string(),
                stage_id: stage_id.to_string(),
            })?;
        stage.order = new_order;
        let updated = stage.clone();

        // Re-validate uniqueness over the whole sequence before persisting.
        StageGraph::new(project_id.to_string(), stages)?;

        self.store.update_stage(project_id, updated.clone())?;
        Ok(updated)
    }

    /// Delete a stage. The store cascade-checks the transition history and
    /// refuses while any record references the stage.
    pub fn remove_stage(&self, project_id: &str, stage_id: &str) -> Result<(), EngineError> {
        self.store.remove_stage(project_id, stage_id)
    }
}
