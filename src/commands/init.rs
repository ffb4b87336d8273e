//! Workspace initialization from a workflow template
//! Usage: stagegate init <template.yaml>

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use crate::engine::Engine;
use crate::gate::{EvaluationContext, GateConfig};
use crate::providers::facts::{SharedFacts, WorkspaceFacts};
use crate::store::FileStore;
use crate::template::WorkflowTemplate;

use super::workspace;

/// Provision a workspace at `root` from a template file.
pub fn init(template_path: &Path, root: &Path) -> Result<()> {
    let template = WorkflowTemplate::load(template_path)?;

    let issues = template.validate();
    if !issues.is_empty() {
        eprintln!("{}", "Template validation failed:".red().bold());
        for issue in &issues {
            eprintln!("  {} {issue}", "✗".red());
        }
        bail!("invalid template: {}", template_path.display());
    }

    let store = FileStore::new(root.to_path_buf());
    if store.exists() {
        bail!("workspace already exists at {}", root.display());
    }

    let facts = SharedFacts::default();
    let context = EvaluationContext::new(
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts),
    );
    let engine = Engine::new(Arc::new(store), context, GateConfig::default());
    engine
        .provision_project(&template)
        .context("Failed to provision project")?;

    // Persist edge bindings and a facts skeleton for later commands.
    workspace::save_conditions(root, &template.conditions)?;
    let facts_path = workspace::facts_path(root);
    if !facts_path.exists() {
        WorkspaceFacts::default().save(&facts_path)?;
    }

    println!(
        "{} project '{}' ({} stages, {} guarded edge(s)) at {}",
        "Initialized".green().bold(),
        template.project.name,
        template.stages.len(),
        template.conditions.len(),
        root.display()
    );
    println!("Next: edit {} with your collaborator data, then run 'stagegate start'", facts_path.display());

    Ok(())
}
