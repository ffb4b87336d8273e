//! Per-type condition evaluation
//!
//! Each evaluator inspects project/stage state through the injected
//! collaborators and produces a `ConditionResult`. Evaluation is side-effect
//! free on domain state, so re-running a check is always safe.

use crate::models::{ConditionResult, ConditionType, Stage, TransitionCondition};
use crate::providers::{ApprovalState, ProviderError};

use super::context::EvaluationContext;

/// Maximum number of item names spelled out in a diagnostic message.
const MAX_LISTED_ITEMS: usize = 5;

/// Evaluate one condition against the (from, to) edge context.
///
/// Never returns an error: a collaborator that cannot answer produces a
/// Failed result flagged indeterminate, so callers can tell "fix the
/// underlying task" apart from "retry once the subsystem is back".
pub fn evaluate_condition(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    from_stage: &Stage,
    to_stage: &Stage,
) -> ConditionResult {
    let outcome = match condition.condition_type {
        ConditionType::TaskCompletion => evaluate_task_completion(ctx, condition, project_id, from_stage),
        ConditionType::DataQuality => evaluate_data_quality(ctx, condition, project_id, from_stage),
        ConditionType::Approval => evaluate_approval(ctx, condition, project_id, from_stage),
        ConditionType::Document => evaluate_document(ctx, condition, project_id, from_stage),
        ConditionType::Custom => evaluate_custom(ctx, condition, project_id, from_stage, to_stage),
    };

    match outcome {
        Ok(result) => result,
        Err(ProviderError::Unavailable(detail)) => ConditionResult::indeterminate(
            condition.id.clone(),
            format!("could not verify: {detail}"),
        ),
    }
}

fn evaluate_task_completion(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    stage: &Stage,
) -> Result<ConditionResult, ProviderError> {
    let outstanding = ctx.tasks().outstanding_tasks(project_id, &stage.id)?;

    if outstanding.is_empty() {
        Ok(ConditionResult::pass(
            condition.id.clone(),
            "all required tasks completed",
        ))
    } else {
        Ok(ConditionResult::fail(
            condition.id.clone(),
            format!(
                "{} required task(s) outstanding: {}",
                outstanding.len(),
                list_items(&outstanding)
            ),
        ))
    }
}

fn evaluate_data_quality(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    stage: &Stage,
) -> Result<ConditionResult, ProviderError> {
    let open = ctx.quality().open_issues(project_id, &stage.id)?;

    if open == 0 {
        Ok(ConditionResult::pass(
            condition.id.clone(),
            "no open quality issues",
        ))
    } else {
        Ok(ConditionResult::fail(
            condition.id.clone(),
            format!("{open} open quality issue(s) for the stage's samples"),
        ))
    }
}

fn evaluate_approval(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    stage: &Stage,
) -> Result<ConditionResult, ProviderError> {
    match ctx.approvals().approval(project_id, &stage.id)? {
        ApprovalState::Approved { approver, at } => Ok(ConditionResult::pass(
            condition.id.clone(),
            format!("signed off by {approver} at {}", at.format("%Y-%m-%d %H:%M")),
        )),
        ApprovalState::Pending { approver } => Ok(ConditionResult::fail(
            condition.id.clone(),
            format!("awaiting sign-off from {approver}"),
        )),
    }
}

fn evaluate_document(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    stage: &Stage,
) -> Result<ConditionResult, ProviderError> {
    let mut missing = Vec::new();
    for name in &stage.deliverables {
        let state = ctx.documents().document(project_id, &stage.id, name)?;
        if !state.is_accepted() {
            missing.push(name.clone());
        }
    }

    if missing.is_empty() {
        Ok(ConditionResult::pass(
            condition.id.clone(),
            format!(
                "all {} deliverable document(s) present and reviewed",
                stage.deliverables.len()
            ),
        ))
    } else {
        Ok(ConditionResult::fail(
            condition.id.clone(),
            format!(
                "{} deliverable(s) missing or unreviewed: {}",
                missing.len(),
                list_items(&missing)
            ),
        ))
    }
}

fn evaluate_custom(
    ctx: &EvaluationContext,
    condition: &TransitionCondition,
    project_id: &str,
    from_stage: &Stage,
    to_stage: &Stage,
) -> Result<ConditionResult, ProviderError> {
    let Some(check) = ctx.custom_check(&condition.id) else {
        return Ok(ConditionResult::indeterminate(
            condition.id.clone(),
            format!("no custom check registered for '{}'", condition.id),
        ));
    };

    let outcome = check.run(project_id, from_stage, to_stage)?;
    if outcome.passed {
        Ok(ConditionResult::pass(condition.id.clone(), outcome.message))
    } else {
        Ok(ConditionResult::fail(condition.id.clone(), outcome.message))
    }
}

fn list_items(items: &[String]) -> String {
    if items.len() <= MAX_LISTED_ITEMS {
        items.join(", ")
    } else {
        format!(
            "{}, … ({} more)",
            items[..MAX_LISTED_ITEMS].join(", "),
            items.len() - MAX_LISTED_ITEMS
        )
    }
}
