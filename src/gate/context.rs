//! Evaluation context and gate configuration

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{
    ApprovalProvider, CustomCheck, DocumentStatusProvider, QualityIssueProvider,
    TaskStatusProvider,
};

/// Default bound on a single condition evaluation.
pub const DEFAULT_CONDITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window within which a gate decision may still be committed.
pub const DEFAULT_DECISION_FRESHNESS: Duration = Duration::from_secs(60);

/// Timing configuration for evaluation and commit.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Maximum wall-clock time for one condition evaluation. A check still
    /// running at the deadline is reported Failed and indeterminate.
    pub condition_timeout: Duration,
    /// Maximum age of a gate decision at commit time.
    pub decision_freshness: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            condition_timeout: DEFAULT_CONDITION_TIMEOUT,
            decision_freshness: DEFAULT_DECISION_FRESHNESS,
        }
    }
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition_timeout(mut self, timeout: Duration) -> Self {
        self.condition_timeout = timeout;
        self
    }

    pub fn with_decision_freshness(mut self, freshness: Duration) -> Self {
        self.decision_freshness = freshness;
        self
    }
}

/// Injected collaborators available to condition evaluators.
///
/// Cloning is cheap (shared handles); a clone travels into each evaluation
/// worker thread.
#[derive(Clone)]
pub struct EvaluationContext {
    tasks: Arc<dyn TaskStatusProvider>,
    quality: Arc<dyn QualityIssueProvider>,
    approvals: Arc<dyn ApprovalProvider>,
    documents: Arc<dyn DocumentStatusProvider>,
    custom_checks: HashMap<String, Arc<dyn CustomCheck>>,
}

impl EvaluationContext {
    pub fn new(
        tasks: Arc<dyn TaskStatusProvider>,
        quality: Arc<dyn QualityIssueProvider>,
        approvals: Arc<dyn ApprovalProvider>,
        documents: Arc<dyn DocumentStatusProvider>,
    ) -> Self {
        Self {
            tasks,
            quality,
            approvals,
            documents,
            custom_checks: HashMap::new(),
        }
    }

    /// Register the check backing a `Custom` condition, keyed by condition id.
    pub fn with_custom_check(
        mut self,
        condition_id: impl Into<String>,
        check: Arc<dyn CustomCheck>,
    ) -> Self {
        self.custom_checks.insert(condition_id.into(), check);
        self
    }

    pub fn tasks(&self) -> &dyn TaskStatusProvider {
        self.tasks.as_ref()
    }

    pub fn quality(&self) -> &dyn QualityIssueProvider {
        self.quality.as_ref()
    }

    pub fn approvals(&self) -> &dyn ApprovalProvider {
        self.approvals.as_ref()
    }

    pub fn documents(&self) -> &dyn DocumentStatusProvider {
        self.documents.as_ref()
    }

    pub fn custom_check(&self, condition_id: &str) -> Option<&Arc<dyn CustomCheck>> {
        self.custom_checks.get(condition_id)
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("custom_checks", &self.custom_checks.keys())
            .finish()
    }
}
