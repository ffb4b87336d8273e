//! Gate evaluation command
//! Usage: stagegate evaluate [--from <id>] [--to <id>] [--condition <id>]

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::gate::GateDecision;
use crate::models::ConditionResult;

use super::workspace::{self, Workspace};

/// Resolve the (from, to) edge: explicit ids, or current stage → next stage.
pub fn resolve_edge(
    ws: &Workspace,
    from: Option<String>,
    to: Option<String>,
) -> Result<(String, String)> {
    let graph = ws.engine.stage_graph(&ws.project_id)?;

    let from_id = match from {
        Some(id) => id,
        None => graph.current_stage().context("Cannot resolve current stage")?.id.clone(),
    };
    let to_id = match to {
        Some(id) => id,
        None => graph
            .next_stage(&from_id)?
            .context("Current stage is the terminal stage; nothing to evaluate")?
            .id
            .clone(),
    };

    Ok((from_id, to_id))
}

pub fn print_result(result: &ConditionResult) {
    let symbol = if result.indeterminate {
        "?".magenta().bold()
    } else if result.is_passed() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {symbol} {} - {}", result.condition_id, result.message);
}

pub fn print_decision(decision: &GateDecision) {
    for result in &decision.results {
        print_result(result);
    }

    if decision.results.is_empty() {
        println!("  (no conditions bound to this edge)");
    }

    let indeterminate = decision.indeterminate_conditions();
    if !indeterminate.is_empty() {
        println!(
            "{} could not evaluate: {} - retry once the subsystem is reachable",
            "!".yellow().bold(),
            indeterminate.join(", ")
        );
    }

    if decision.admissible {
        println!("{}", "Transition admissible.".green().bold());
    } else {
        println!("{}", "Transition blocked.".red().bold());
    }
}

/// Evaluate the gate for a transition, or re-run a single condition.
pub fn evaluate(
    root: &Path,
    from: Option<String>,
    to: Option<String>,
    condition: Option<String>,
) -> Result<()> {
    let ws = workspace::open(root)?;
    let (from_id, to_id) = resolve_edge(&ws, from, to)?;

    if let Some(condition_id) = condition {
        let result = ws
            .engine
            .evaluate_condition(&ws.project_id, &from_id, &to_id, &condition_id)?;
        print_result(&result);
        return Ok(());
    }

    println!("Evaluating transition '{from_id}' → '{to_id}'...");
    let decision = ws
        .engine
        .evaluate_transition(&ws.project_id, &from_id, &to_id)?;
    print_decision(&decision);

    Ok(())
}
