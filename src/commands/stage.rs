//! Stage state manipulation
//! Usage: stagegate start | block <id> | unblock <id> | regress ...

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::models::Authorization;

use super::workspace;

/// Start the project: its first stage enters InProgress.
pub fn start(root: &Path) -> Result<()> {
    let ws = workspace::open(root)?;
    let stage = ws.engine.start_project(&ws.project_id)?;

    println!(
        "{} stage '{}' ({}) is now in progress",
        "Started:".green().bold(),
        stage.name,
        stage.id
    );
    Ok(())
}

/// Mark a stage stalled.
pub fn block(root: &Path, stage_id: &str) -> Result<()> {
    let ws = workspace::open(root)?;
    let stage = ws.engine.mark_blocked(&ws.project_id, stage_id)?;

    println!("{} stage '{}' is blocked", "✗".red().bold(), stage.id);
    Ok(())
}

/// Recover a stalled stage.
pub fn unblock(root: &Path, stage_id: &str) -> Result<()> {
    let ws = workspace::open(root)?;
    let stage = ws.engine.unblock(&ws.project_id, stage_id)?;

    println!(
        "{} stage '{}' is back in progress",
        "●".blue().bold(),
        stage.id
    );
    Ok(())
}

/// Move the project one stage backward under explicit authorization.
pub fn regress(
    root: &Path,
    authorized_by: String,
    reason: String,
    notes: Option<String>,
) -> Result<()> {
    let ws = workspace::open(root)?;
    let record = ws.engine.regress(
        &ws.project_id,
        Authorization {
            authorized_by,
            reason,
        },
        notes,
    )?;

    println!(
        "{} '{}' reset, '{}' reopened (record {})",
        "Regressed:".yellow().bold(),
        record.from_stage_id,
        record.to_stage_id,
        record.id
    );
    Ok(())
}
