//! Workspace loading shared by all commands
//!
//! A workspace directory carries the file-backed store plus the two
//! configuration files the engine needs at open time: `conditions.yaml`
//! (per-edge bindings) and `facts.yaml` (collaborator data for the
//! file-backed providers).

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::Engine;
use crate::gate::{EvaluationContext, GateConfig};
use crate::providers::facts::SharedFacts;
use crate::store::FileStore;
use crate::template::EdgeTemplate;

/// An opened workspace: the engine plus the identity of its single project.
pub struct Workspace {
    pub engine: Engine,
    pub project_id: String,
    pub facts: SharedFacts,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("project_id", &self.project_id)
            .field("facts", &self.facts)
            .finish_non_exhaustive()
    }
}

pub fn conditions_path(root: &Path) -> PathBuf {
    root.join("conditions.yaml")
}

pub fn facts_path(root: &Path) -> PathBuf {
    root.join("facts.yaml")
}

/// Open the workspace at `root`, wiring the file store, the fact providers,
/// and the edge condition bindings into an engine.
pub fn open(root: &Path) -> Result<Workspace> {
    let store = FileStore::new(root.to_path_buf());
    if !store.exists() {
        bail!(
            "no workspace found at {} - run 'stagegate init <template>' first",
            root.display()
        );
    }

    let project_id = store
        .project_id()
        .context("Failed to read workspace project")?;

    let facts = if facts_path(root).exists() {
        SharedFacts::from_file(&facts_path(root))?
    } else {
        SharedFacts::default()
    };

    let context = EvaluationContext::new(
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
    );

    let engine = Engine::new(Arc::new(store), context, GateConfig::default());

    for edge in load_conditions(root)? {
        engine
            .bind_conditions(&project_id, &edge.from, &edge.to, edge.conditions)
            .with_context(|| {
                format!("Failed to bind conditions on edge '{}' -> '{}'", edge.from, edge.to)
            })?;
    }

    Ok(Workspace {
        engine,
        project_id,
        facts,
    })
}

/// Read the per-edge condition bindings, if the workspace has any.
pub fn load_conditions(root: &Path) -> Result<Vec<EdgeTemplate>> {
    let path = conditions_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read conditions file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse conditions file: {}", path.display()))
}

/// Write the per-edge condition bindings.
pub fn save_conditions(root: &Path, edges: &[EdgeTemplate]) -> Result<()> {
    let yaml = serde_yaml::to_string(edges).context("Failed to serialize conditions")?;
    std::fs::write(conditions_path(root), yaml)
        .with_context(|| format!("Failed to write conditions file under {}", root.display()))
}
