//! Transition gate
//!
//! This module handles:
//! - Evaluating the condition set guarding a prospective transition
//! - Fanning evaluations out across worker threads and waiting for all of
//!   them to reach a terminal status before aggregating
//! - Producing `GateDecision`s that the executor can later commit

pub mod context;
pub mod evaluator;
pub mod executor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::graph::StageGraph;
use crate::models::{ConditionResult, Stage, TransitionCondition};
use crate::registry::ConditionRegistry;
use crate::store::StageStore;

pub use context::{EvaluationContext, GateConfig};
pub use executor::TransitionExecutor;

/// Granularity of the collector's poll for results and cancellation.
const COLLECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A caller's intent to move a project from one stage to the next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRequest {
    pub project_id: String,
    pub from_stage_id: String,
    pub to_stage_id: String,
}

impl TransitionRequest {
    pub fn new(
        project_id: impl Into<String>,
        from_stage_id: impl Into<String>,
        to_stage_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            from_stage_id: from_stage_id.into(),
            to_stage_id: to_stage_id.into(),
        }
    }
}

/// Cooperative cancellation flag for an in-flight evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Knobs for one evaluate call.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Accept a previously-computed decision for the same edge if it is
    /// younger than this and the graph has not changed since. Without an
    /// explicit TTL every call re-runs all evaluators.
    pub cached_within: Option<Duration>,
    /// Observe this token to abort the evaluation early.
    pub cancel: Option<CancelToken>,
}

/// Aggregated admissibility verdict plus per-condition diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub id: Uuid,
    pub project_id: String,
    pub from_stage_id: String,
    pub to_stage_id: String,
    /// Store version the evaluation saw. Commit rejects the decision once
    /// the graph has moved past it.
    pub graph_version: u64,
    pub admissible: bool,
    pub results: Vec<ConditionResult>,
    pub evaluated_at: DateTime<Utc>,
}

impl GateDecision {
    /// True if this decision was produced for the given request.
    pub fn matches(&self, request: &TransitionRequest) -> bool {
        self.project_id == request.project_id
            && self.from_stage_id == request.from_stage_id
            && self.to_stage_id == request.to_stage_id
    }

    /// Ids of conditions whose checks could not run. Non-empty means the
    /// caller should retry later rather than chase unmet conditions.
    pub fn indeterminate_conditions(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.indeterminate)
            .map(|r| r.condition_id.as_str())
            .collect()
    }

    pub fn failed_conditions(&self) -> Vec<&ConditionResult> {
        self.results.iter().filter(|r| !r.is_passed()).collect()
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.evaluated_at).to_std().unwrap_or_default()
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() <= window
    }
}

type EdgeKey = (String, String, String);

/// Decides whether a transition request is admissible.
pub struct TransitionGate {
    store: Arc<dyn StageStore>,
    registry: Arc<RwLock<ConditionRegistry>>,
    context: EvaluationContext,
    config: GateConfig,
    cache: Mutex<std::collections::HashMap<EdgeKey, GateDecision>>,
}

impl TransitionGate {
    pub fn new(
        store: Arc<dyn StageStore>,
        registry: Arc<RwLock<ConditionRegistry>>,
        context: EvaluationContext,
        config: GateConfig,
    ) -> Self {
        Self {
            store,
            registry,
            context,
            config,
            cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Evaluate a transition request, freshly re-running all condition
    /// evaluators.
    pub fn evaluate(&self, request: &TransitionRequest) -> Result<GateDecision, EngineError> {
        self.evaluate_with_options(request, &EvaluateOptions::default())
    }

    /// Evaluate a transition request.
    ///
    /// Validates the edge first and fails fast without touching any
    /// evaluator if the transition skips the sequence. Condition evaluations
    /// run concurrently; the verdict is aggregated only once every condition
    /// has a terminal result. The verdict is deterministic for a given set
    /// of results regardless of completion order.
    pub fn evaluate_with_options(
        &self,
        request: &TransitionRequest,
        options: &EvaluateOptions,
    ) -> Result<GateDecision, EngineError> {
        if let Some(token) = &options.cancel {
            if token.is_cancelled() {
                return Err(EngineError::EvaluationCancelled);
            }
        }

        let snapshot = self.store.snapshot(&request.project_id)?;
        let graph = StageGraph::new(request.project_id.clone(), snapshot.stages)?;
        if graph.is_empty() {
            return Err(EngineError::NoStagesDefined(request.project_id.clone()));
        }
        graph.validate_edge(&request.from_stage_id, &request.to_stage_id)?;

        let key = edge_key(request);
        if let Some(ttl) = options.cached_within {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(&key) {
                if cached.graph_version == snapshot.version && cached.is_fresh(ttl) {
                    debug!(
                        project = %request.project_id,
                        from = %request.from_stage_id,
                        to = %request.to_stage_id,
                        "returning cached gate decision"
                    );
                    return Ok(cached.clone());
                }
            }
        }

        let conditions = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            registry.conditions_for(
                &request.project_id,
                &request.from_stage_id,
                &request.to_stage_id,
            )
        };

        let from_stage = graph.stage(&request.from_stage_id)?.clone();
        let to_stage = graph.stage(&request.to_stage_id)?.clone();

        let results = self.run_conditions(
            &conditions,
            &request.project_id,
            &from_stage,
            &to_stage,
            options.cancel.as_ref(),
        )?;

        // All required conditions passed, and nothing indeterminate: an
        // unanswered check never silently counts as passed or as merely
        // advisory.
        let admissible = conditions
            .iter()
            .zip(&results)
            .all(|(c, r)| !c.required || r.is_passed())
            && results.iter().all(|r| !r.indeterminate);

        let decision = GateDecision {
            id: Uuid::new_v4(),
            project_id: request.project_id.clone(),
            from_stage_id: request.from_stage_id.clone(),
            to_stage_id: request.to_stage_id.clone(),
            graph_version: snapshot.version,
            admissible,
            results,
            evaluated_at: Utc::now(),
        };

        debug!(
            project = %request.project_id,
            from = %request.from_stage_id,
            to = %request.to_stage_id,
            admissible = decision.admissible,
            conditions = decision.results.len(),
            "gate decision"
        );

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, decision.clone());
        Ok(decision)
    }

    /// Re-run a single condition on an edge, for callers that want to retry
    /// one failed check without re-evaluating the whole set.
    pub fn evaluate_condition_by_id(
        &self,
        request: &TransitionRequest,
        condition_id: &str,
    ) -> Result<ConditionResult, EngineError> {
        let snapshot = self.store.snapshot(&request.project_id)?;
        let graph = StageGraph::new(request.project_id.clone(), snapshot.stages)?;
        graph.validate_edge(&request.from_stage_id, &request.to_stage_id)?;

        let condition = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            registry.condition(
                &request.project_id,
                &request.from_stage_id,
                &request.to_stage_id,
                condition_id,
            )?
        };

        let from_stage = graph.stage(&request.from_stage_id)?.clone();
        let to_stage = graph.stage(&request.to_stage_id)?.clone();

        let mut results =
            self.run_conditions(&[condition], &request.project_id, &from_stage, &to_stage, None)?;
        Ok(results.remove(0))
    }

    /// Fan conditions out across worker threads and collect every result.
    ///
    /// A worker that has not reported by the per-evaluation deadline is
    /// abandoned and its condition recorded as Failed + indeterminate; the
    /// worker itself runs to completion in the background but its late result
    /// is discarded (evaluators are read-only, so nothing leaks).
    fn run_conditions(
        &self,
        conditions: &[TransitionCondition],
        project_id: &str,
        from_stage: &Stage,
        to_stage: &Stage,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<ConditionResult>, EngineError> {
        if conditions.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel::<(usize, ConditionResult)>();

        for (index, condition) in conditions.iter().enumerate() {
            let tx = tx.clone();
            let ctx = self.context.clone();
            let condition = condition.clone();
            let project_id = project_id.to_string();
            let from_stage = from_stage.clone();
            let to_stage = to_stage.clone();
            let cancel = cancel.cloned();

            thread::spawn(move || {
                // Observe cancellation before doing any work.
                if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                    return;
                }
                let result =
                    evaluator::evaluate_condition(&ctx, &condition, &project_id, &from_stage, &to_stage);
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.config.condition_timeout;
        let mut slots: Vec<Option<ConditionResult>> = vec![None; conditions.len()];
        let mut received = 0;

        while received < conditions.len() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(EngineError::EvaluationCancelled);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match rx.recv_timeout(remaining.min(COLLECT_POLL_INTERVAL)) {
                Ok((index, result)) => {
                    if slots[index].is_none() {
                        received += 1;
                    }
                    slots[index] = Some(result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let timeout_secs = self.config.condition_timeout.as_secs_f64();
        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    ConditionResult::indeterminate(
                        conditions[index].id.clone(),
                        format!("evaluation timed out after {timeout_secs:.1}s"),
                    )
                })
            })
            .collect();

        Ok(results)
    }
}

fn edge_key(request: &TransitionRequest) -> EdgeKey {
    (
        request.project_id.clone(),
        request.from_stage_id.clone(),
        request.to_stage_id.clone(),
    )
}
