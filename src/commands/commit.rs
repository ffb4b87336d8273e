//! Transition commit command
//! Usage: stagegate commit [--from <id>] [--to <id>] [--notes <text>]

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use super::evaluate::{print_decision, resolve_edge};
use super::workspace;

/// Evaluate the gate and, if admissible, commit the transition.
///
/// Evaluation and commit happen back-to-back so the decision is always well
/// inside the freshness window; a conflicting commit from another process
/// still surfaces as an error rather than corrupted state.
pub fn commit(
    root: &Path,
    from: Option<String>,
    to: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let ws = workspace::open(root)?;
    let (from_id, to_id) = resolve_edge(&ws, from, to)?;

    println!("Evaluating transition '{from_id}' → '{to_id}'...");
    let decision = ws
        .engine
        .evaluate_transition(&ws.project_id, &from_id, &to_id)?;
    print_decision(&decision);

    if !decision.admissible {
        bail!("transition is not admissible; fix the failing conditions and retry");
    }

    let record = ws
        .engine
        .commit_transition(&ws.project_id, &from_id, &to_id, &decision, notes)?;

    println!(
        "{} '{from_id}' completed, '{to_id}' in progress (record {})",
        "Committed:".green().bold(),
        record.id
    );

    Ok(())
}
