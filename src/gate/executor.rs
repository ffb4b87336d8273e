//! Transition executor
//!
//! This module handles:
//! - Committing an admissible transition atomically (stage statuses + history)
//! - Starting a project's first stage
//! - Blocking, unblocking, and explicitly-authorized regression
//!
//! Commits are serialized per project through a lock map, and the store's
//! version compare-and-swap rejects any commit whose gate decision was
//! produced against a graph that has since moved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::graph::StageGraph;
use crate::models::{Authorization, Stage, StageStatus, TransitionRecord};
use crate::store::{GraphSnapshot, StageStore};

use super::context::GateConfig;
use super::{GateDecision, TransitionRequest};

pub struct TransitionExecutor {
    store: Arc<dyn StageStore>,
    config: GateConfig,
    commit_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TransitionExecutor {
    pub fn new(store: Arc<dyn StageStore>, config: GateConfig) -> Self {
        Self {
            store,
            config,
            commit_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-project mutex serializing commits.
    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn locked_snapshot(&self, project_id: &str) -> Result<(StageGraph, GraphSnapshot), EngineError> {
        let snapshot = self.store.snapshot(project_id)?;
        let graph = StageGraph::new(project_id.to_string(), snapshot.stages.clone())?;
        Ok((graph, snapshot))
    }

    /// Commit an admissible transition.
    ///
    /// The decision must have been produced by a gate evaluation of the
    /// *same* request, must still be inside the freshness window, and must
    /// have seen the current graph version. On success the from-stage is
    /// completed, the to-stage started, and a transition record appended,
    /// all-or-nothing.
    pub fn commit(
        &self,
        request: &TransitionRequest,
        decision: &GateDecision,
        notes: Option<String>,
    ) -> Result<TransitionRecord, EngineError> {
        if !decision.matches(request) {
            return Err(EngineError::StaleDecision {
                decision_id: decision.id,
                reason: "decision was produced for a different request".to_string(),
            });
        }
        if !decision.admissible {
            return Err(EngineError::InadmissibleDecision {
                decision_id: decision.id,
            });
        }
        if !decision.is_fresh(self.config.decision_freshness) {
            return Err(EngineError::StaleDecision {
                decision_id: decision.id,
                reason: format!(
                    "evaluated {:.1}s ago, freshness window is {:.1}s",
                    decision.age().as_secs_f64(),
                    self.config.decision_freshness.as_secs_f64()
                ),
            });
        }

        let lock = self.project_lock(&request.project_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (graph, snapshot) = self.locked_snapshot(&request.project_id)?;
        if snapshot.version != decision.graph_version {
            return Err(EngineError::ConcurrentTransitionConflict {
                project_id: request.project_id.clone(),
                expected: decision.graph_version,
                actual: snapshot.version,
            });
        }
        graph.validate_edge(&request.from_stage_id, &request.to_stage_id)?;

        let mut from_stage = graph.stage(&request.from_stage_id)?.clone();
        let mut to_stage = graph.stage(&request.to_stage_id)?.clone();
        from_stage.try_complete()?;
        to_stage.try_start()?;

        let record = TransitionRecord::advance(
            request.project_id.clone(),
            from_stage.id.clone(),
            to_stage.id.clone(),
            decision.id,
            decision.results.clone(),
            notes,
        );

        self.store.apply_transition(
            &request.project_id,
            decision.graph_version,
            from_stage,
            to_stage,
            record.clone(),
        )?;

        info!(
            project = %request.project_id,
            from = %request.from_stage_id,
            to = %request.to_stage_id,
            record = %record.id,
            "transition committed"
        );
        Ok(record)
    }

    /// Start a project: its first stage moves NotStarted -> InProgress.
    /// Rejected once any stage has been entered.
    pub fn start_project(&self, project_id: &str) -> Result<Stage, EngineError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (graph, _snapshot) = self.locked_snapshot(project_id)?;
        let current = graph.current_stage()?;

        if graph
            .stages()
            .iter()
            .any(|s| s.status != StageStatus::NotStarted)
        {
            return Err(EngineError::InvalidStageTransition {
                from: current.status.to_string(),
                to: StageStatus::InProgress.to_string(),
            });
        }

        let mut stage = current.clone();
        stage.try_start()?;
        self.store.update_stage(project_id, stage.clone())?;

        info!(project = %project_id, stage = %stage.id, "project started");
        Ok(stage)
    }

    /// Mark the active stage stalled: InProgress -> Blocked.
    pub fn mark_blocked(&self, project_id: &str, stage_id: &str) -> Result<Stage, EngineError> {
        self.change_status(project_id, stage_id, Stage::try_mark_blocked)
    }

    /// Recover a stalled stage: Blocked -> InProgress.
    pub fn unblock(&self, project_id: &str, stage_id: &str) -> Result<Stage, EngineError> {
        self.change_status(project_id, stage_id, Stage::try_unblock)
    }

    fn change_status(
        &self,
        project_id: &str,
        stage_id: &str,
        apply: impl Fn(&mut Stage) -> Result<(), EngineError>,
    ) -> Result<Stage, EngineError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (graph, _snapshot) = self.locked_snapshot(project_id)?;
        let mut stage = graph.stage(stage_id)?.clone();
        apply(&mut stage)?;
        self.store.update_stage(project_id, stage.clone())?;

        debug!(project = %project_id, stage = %stage_id, status = %stage.status, "stage status changed");
        Ok(stage)
    }

    /// Move the project one stage backward under explicit authorization.
    ///
    /// The current stage (active or stalled) is reset to NotStarted and the
    /// previous completed stage reopened to InProgress. This is the only
    /// backward path; the gate's sequential edge policy is untouched by it.
    pub fn regress(
        &self,
        project_id: &str,
        authorization: Authorization,
        notes: Option<String>,
    ) -> Result<TransitionRecord, EngineError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (graph, snapshot) = self.locked_snapshot(project_id)?;
        let current = graph.current_stage()?.clone();

        if !matches!(
            current.status,
            StageStatus::InProgress | StageStatus::Blocked | StageStatus::NotStarted
        ) {
            return Err(EngineError::InvalidStageTransition {
                from: current.status.to_string(),
                to: StageStatus::NotStarted.to_string(),
            });
        }

        let previous = graph
            .previous_stage(&current.id)?
            .ok_or_else(|| EngineError::NoPreviousStage {
                stage_id: current.id.clone(),
            })?
            .clone();

        let mut reset_stage = current.clone();
        reset_stage.reset();
        let mut reopened = previous.clone();
        reopened.reopen();

        let record = TransitionRecord::regression(
            project_id.to_string(),
            current.id.clone(),
            previous.id.clone(),
            authorization,
            notes,
        );

        self.store.apply_transition(
            project_id,
            snapshot.version,
            reset_stage,
            reopened,
            record.clone(),
        )?;

        info!(
            project = %project_id,
            from = %current.id,
            to = %previous.id,
            "regression committed"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionResult, StageStatus};
    use crate::store::{InMemoryStore, ProjectMeta};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .init_project(ProjectMeta::new("p1", "Assay Validation"))
            .expect("Should init project");

        let mut a = Stage::new("p1", "prep", 1, "Preparation");
        a.status = StageStatus::InProgress;
        store.insert_stage("p1", a).expect("Should insert");
        store
            .insert_stage("p1", Stage::new("p1", "validation", 2, "Validation"))
            .expect("Should insert");
        store
    }

    fn admissible_decision(store: &InMemoryStore) -> GateDecision {
        let version = store.snapshot("p1").expect("Should snapshot").version;
        GateDecision {
            id: Uuid::new_v4(),
            project_id: "p1".to_string(),
            from_stage_id: "prep".to_string(),
            to_stage_id: "validation".to_string(),
            graph_version: version,
            admissible: true,
            results: vec![ConditionResult::pass("c1", "all required tasks completed")],
            evaluated_at: Utc::now(),
        }
    }

    fn request() -> TransitionRequest {
        TransitionRequest::new("p1", "prep", "validation")
    }

    #[test]
    fn test_commit_happy_path() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let decision = admissible_decision(&store);

        let record = executor
            .commit(&request(), &decision, Some("approved at gate review".to_string()))
            .expect("Should commit");

        assert_eq!(record.decision_id, Some(decision.id));
        assert_eq!(record.conditions.len(), 1);

        let snapshot = store.snapshot("p1").expect("Should snapshot");
        assert_eq!(snapshot.stages[0].status, StageStatus::Completed);
        assert!(snapshot.stages[0].end_date.is_some());
        assert_eq!(snapshot.stages[1].status, StageStatus::InProgress);
        assert!(snapshot.stages[1].start_date.is_some());
        assert_eq!(store.history("p1").expect("Should read").len(), 1);
    }

    #[test]
    fn test_commit_rejects_inadmissible_decision() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let mut decision = admissible_decision(&store);
        decision.admissible = false;

        assert!(matches!(
            executor.commit(&request(), &decision, None),
            Err(EngineError::InadmissibleDecision { .. })
        ));
    }

    #[test]
    fn test_commit_rejects_mismatched_request() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let decision = admissible_decision(&store);

        let other = TransitionRequest::new("p1", "validation", "prep");
        assert!(matches!(
            executor.commit(&other, &decision, None),
            Err(EngineError::StaleDecision { .. })
        ));
    }

    #[test]
    fn test_commit_rejects_decision_outside_freshness_window() {
        let store = seeded_store();
        let config = GateConfig::new().with_decision_freshness(Duration::from_millis(10));
        let executor = TransitionExecutor::new(store.clone(), config);
        let mut decision = admissible_decision(&store);
        decision.evaluated_at = Utc::now() - chrono::Duration::seconds(5);

        assert!(matches!(
            executor.commit(&request(), &decision, None),
            Err(EngineError::StaleDecision { .. })
        ));
    }

    #[test]
    fn test_commit_conflicts_when_graph_moved() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let decision = admissible_decision(&store);

        // A metadata edit after evaluation bumps the version.
        let snapshot = store.snapshot("p1").expect("Should snapshot");
        let mut stage = snapshot.stages[1].clone();
        stage.rename("Method Validation".to_string());
        store.update_stage("p1", stage).expect("Should update");

        assert!(matches!(
            executor.commit(&request(), &decision, None),
            Err(EngineError::ConcurrentTransitionConflict { .. })
        ));

        // Nothing changed.
        let after = store.snapshot("p1").expect("Should snapshot");
        assert_eq!(after.stages[0].status, StageStatus::InProgress);
        assert_eq!(after.stages[1].status, StageStatus::NotStarted);
    }

    #[test]
    fn test_start_project_enters_first_stage() {
        let store = Arc::new(InMemoryStore::new());
        store
            .init_project(ProjectMeta::new("p1", "Assay Validation"))
            .expect("Should init project");
        store
            .insert_stage("p1", Stage::new("p1", "prep", 1, "Preparation"))
            .expect("Should insert");
        store
            .insert_stage("p1", Stage::new("p1", "validation", 2, "Validation"))
            .expect("Should insert");

        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let stage = executor.start_project("p1").expect("Should start");

        assert_eq!(stage.id, "prep");
        assert_eq!(stage.status, StageStatus::InProgress);

        // Starting again is rejected.
        assert!(matches!(
            executor.start_project("p1"),
            Err(EngineError::InvalidStageTransition { .. })
        ));
    }

    #[test]
    fn test_block_unblock_roundtrip() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());

        let blocked = executor
            .mark_blocked("p1", "prep")
            .expect("Should block active stage");
        assert_eq!(blocked.status, StageStatus::Blocked);

        // A NotStarted stage cannot be blocked.
        assert!(executor.mark_blocked("p1", "validation").is_err());

        let unblocked = executor.unblock("p1", "prep").expect("Should unblock");
        assert_eq!(unblocked.status, StageStatus::InProgress);
    }

    #[test]
    fn test_regress_reopens_previous_stage() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());
        let decision = admissible_decision(&store);
        executor
            .commit(&request(), &decision, None)
            .expect("Should commit");

        let record = executor
            .regress(
                "p1",
                Authorization {
                    authorized_by: "lab-director".to_string(),
                    reason: "method drift discovered".to_string(),
                },
                None,
            )
            .expect("Should regress");

        assert_eq!(record.from_stage_id, "validation");
        assert_eq!(record.to_stage_id, "prep");

        let snapshot = store.snapshot("p1").expect("Should snapshot");
        assert_eq!(snapshot.stages[0].status, StageStatus::InProgress);
        assert!(snapshot.stages[0].end_date.is_none());
        assert_eq!(snapshot.stages[1].status, StageStatus::NotStarted);
        assert_eq!(store.history("p1").expect("Should read").len(), 2);
    }

    #[test]
    fn test_regress_from_first_stage_fails() {
        let store = seeded_store();
        let executor = TransitionExecutor::new(store.clone(), GateConfig::default());

        assert!(matches!(
            executor.regress(
                "p1",
                Authorization {
                    authorized_by: "lab-director".to_string(),
                    reason: "n/a".to_string(),
                },
                None,
            ),
            Err(EngineError::NoPreviousStage { .. })
        ));
    }
}
