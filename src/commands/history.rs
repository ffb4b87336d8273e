//! Transition history display
//! Usage: stagegate history

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::models::TransitionKind;

use super::workspace;

/// Print the project's append-only transition history.
pub fn show(root: &Path) -> Result<()> {
    let ws = workspace::open(root)?;
    let history = ws.engine.history(&ws.project_id)?;

    if history.is_empty() {
        println!("(no transitions committed yet)");
        return Ok(());
    }

    for record in &history {
        let arrow = match record.kind {
            TransitionKind::Advance => "→".green(),
            TransitionKind::Regression => "←".yellow(),
        };
        println!(
            "{} {} {arrow} {}  {}",
            record.committed_at.format("%Y-%m-%d %H:%M:%S"),
            record.from_stage_id,
            record.to_stage_id,
            record.id.to_string().dimmed()
        );

        if let Some(auth) = &record.authorization {
            println!(
                "    authorized by {} - {}",
                auth.authorized_by, auth.reason
            );
        }
        if let Some(notes) = &record.notes {
            println!("    notes: {notes}");
        }
        for result in &record.conditions {
            println!("    {}", result.summary().dimmed());
        }
    }

    Ok(())
}
