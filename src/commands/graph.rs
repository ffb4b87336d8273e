//! Stage graph display
//! Usage: stagegate graph

use anyhow::Result;
use colored::{ColoredString, Colorize};
use std::path::Path;

use crate::models::{Stage, StageStatus};

use super::workspace;

/// Status indicator with color for display
fn status_indicator(status: &StageStatus) -> ColoredString {
    match status {
        StageStatus::Completed => "✓".green().bold(),
        StageStatus::InProgress => "●".blue().bold(),
        StageStatus::NotStarted => "○".white().dimmed(),
        StageStatus::Blocked => "✗".red().bold(),
    }
}

fn format_dates(stage: &Stage) -> String {
    match (&stage.start_date, &stage.end_date) {
        (Some(start), Some(end)) => {
            format!("{} → {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
        }
        (Some(start), None) => format!("started {}", start.format("%Y-%m-%d")),
        _ => match stage.estimated_duration_days {
            Some(days) => format!("~{days}d"),
            None => String::new(),
        },
    }
}

/// Print the project's stage sequence with statuses and guarded edges.
pub fn show(root: &Path) -> Result<()> {
    let ws = workspace::open(root)?;
    let meta = ws.engine.project_meta(&ws.project_id)?;
    let graph = ws.engine.stage_graph(&ws.project_id)?;

    println!(
        "{} {} [{}]",
        "Project:".bold(),
        meta.name,
        graph.project_status()
    );
    println!("─────────────────────────────────────────────────────────");

    if graph.is_empty() {
        println!("(no stages defined)");
        return Ok(());
    }

    let current_id = graph.current_stage().map(|s| s.id.clone()).ok();
    let stages = graph.stages();

    for (i, stage) in stages.iter().enumerate() {
        let marker = if current_id.as_deref() == Some(stage.id.as_str()) {
            "▶"
        } else {
            " "
        };
        println!(
            "{marker} {} {:>2}. {} ({})  {}",
            status_indicator(&stage.status),
            stage.order,
            stage.name,
            stage.id,
            format_dates(stage).dimmed()
        );

        // Show the conditions guarding the edge to the next stage.
        if let Some(next) = stages.get(i + 1) {
            let conditions = ws
                .engine
                .conditions_for(&ws.project_id, &stage.id, &next.id);
            for condition in conditions {
                let flag = if condition.required {
                    "required".yellow()
                } else {
                    "advisory".dimmed()
                };
                println!("      │ {} [{}] ({flag})", condition.name, condition.condition_type);
            }
        }
    }

    Ok(())
}
