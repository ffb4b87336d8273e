//! In-memory stage store
//!
//! Backs tests and embedders that bring their own persistence. A single
//! `RwLock` over the project table gives readers consistent snapshots and
//! serializes mutations; the per-project version counter provides the
//! compare-and-swap that commit relies on.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::EngineError;
use crate::models::{Stage, TransitionRecord};

use super::{GraphSnapshot, ProjectMeta, StageStore};

#[derive(Debug)]
struct ProjectState {
    meta: ProjectMeta,
    stages: BTreeMap<String, Stage>,
    history: Vec<TransitionRecord>,
    version: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    projects: RwLock<HashMap<String, ProjectState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ProjectState>> {
        self.projects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProjectState>> {
        self.projects.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn stage_not_found(project_id: &str, stage_id: &str) -> EngineError {
    EngineError::StageNotFound {
        project_id: project_id.to_string(),
        stage_id: stage_id.to_string(),
    }
}

impl StageStore for InMemoryStore {
    fn init_project(&self, meta: ProjectMeta) -> Result<(), EngineError> {
        let mut projects = self.write();
        if projects.contains_key(&meta.id) {
            return Err(EngineError::Store(format!(
                "project '{}' already exists",
                meta.id
            )));
        }
        projects.insert(
            meta.id.clone(),
            ProjectState {
                meta,
                stages: BTreeMap::new(),
                history: Vec::new(),
                version: 0,
            },
        );
        Ok(())
    }

    fn project_meta(&self, project_id: &str) -> Result<ProjectMeta, EngineError> {
        let projects = self.read();
        projects
            .get(project_id)
            .map(|p| p.meta.clone())
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))
    }

    fn snapshot(&self, project_id: &str) -> Result<GraphSnapshot, EngineError> {
        let projects = self.read();
        let project = projects
            .get(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        let mut stages: Vec<Stage> = project.stages.values().cloned().collect();
        stages.sort_by_key(|s| s.order);

        Ok(GraphSnapshot {
            stages,
            version: project.version,
        })
    }

    fn insert_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError> {
        let mut projects = self.write();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        if project.stages.contains_key(&stage.id) {
            return Err(EngineError::Store(format!(
                "stage '{}' already exists in project '{project_id}'",
                stage.id
            )));
        }

        project.stages.insert(stage.id.clone(), stage);
        project.version += 1;
        Ok(())
    }

    fn update_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError> {
        let mut projects = self.write();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        if !project.stages.contains_key(&stage.id) {
            return Err(stage_not_found(project_id, &stage.id));
        }

        project.stages.insert(stage.id.clone(), stage);
        project.version += 1;
        Ok(())
    }

    fn remove_stage(&self, project_id: &str, stage_id: &str) -> Result<(), EngineError> {
        let mut projects = self.write();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        if !project.stages.contains_key(stage_id) {
            return Err(stage_not_found(project_id, stage_id));
        }

        let references = project
            .history
            .iter()
            .filter(|r| r.references_stage(stage_id))
            .count();
        if references > 0 {
            return Err(EngineError::StageReferencedByHistory {
                stage_id: stage_id.to_string(),
                records: references,
            });
        }

        project.stages.remove(stage_id);
        project.version += 1;
        Ok(())
    }

    fn apply_transition(
        &self,
        project_id: &str,
        expected_version: u64,
        from: Stage,
        to: Stage,
        record: TransitionRecord,
    ) -> Result<(), EngineError> {
        let mut projects = self.write();
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        if project.version != expected_version {
            return Err(EngineError::ConcurrentTransitionConflict {
                project_id: project_id.to_string(),
                expected: expected_version,
                actual: project.version,
            });
        }
        if !project.stages.contains_key(&from.id) {
            return Err(stage_not_found(project_id, &from.id));
        }
        if !project.stages.contains_key(&to.id) {
            return Err(stage_not_found(project_id, &to.id));
        }

        // All validation done; the swap below cannot fail partway.
        project.stages.insert(from.id.clone(), from);
        project.stages.insert(to.id.clone(), to);
        project.history.push(record);
        project.version += 1;
        Ok(())
    }

    fn history(&self, project_id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        let projects = self.read();
        projects
            .get(project_id)
            .map(|p| p.history.clone())
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))
    }
}
