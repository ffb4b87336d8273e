//! File-backed stage store
//!
//! Persists a single project as a `.gate/` workspace directory:
//!
//! ```text
//! .gate/
//!   project.yaml      project identity + version counter
//!   stages/NN-id.md   one stage per file, YAML frontmatter + markdown body
//!   history.jsonl     append-only transition records
//!   lock              advisory lock file
//! ```
//!
//! All access goes through `fs2` advisory locks on the lock file: shared for
//! snapshots and history reads, exclusive for mutations. Advisory locks are
//! cooperative; every participant must open the workspace through this store
//! for the locking to be effective.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::models::{Stage, TransitionRecord};

use super::{GraphSnapshot, ProjectMeta, StageStore};

#[derive(Debug, Serialize, Deserialize)]
struct ProjectFile {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    version: u64,
}

/// Workspace-directory store. One workspace holds one project.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

/// Holds the advisory lock for the duration of one store operation.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.project_path().exists()
    }

    /// Id of the project this workspace holds.
    pub fn project_id(&self) -> Result<String, EngineError> {
        let path = self.project_path();
        if !path.exists() {
            return Err(EngineError::Store(format!(
                "no workspace at {}",
                self.root.display()
            )));
        }
        let content = fs::read_to_string(&path).map_err(EngineError::store)?;
        let project: ProjectFile = serde_yaml::from_str(&content).map_err(EngineError::store)?;
        Ok(project.id)
    }

    fn project_path(&self) -> PathBuf {
        self.root.join("project.yaml")
    }

    fn stages_dir(&self) -> PathBuf {
        self.root.join("stages")
    }

    fn history_path(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    fn lock_shared(&self) -> Result<LockGuard, EngineError> {
        let file = self.open_lock_file()?;
        file.lock_shared().map_err(EngineError::store)?;
        Ok(LockGuard { file })
    }

    fn lock_exclusive(&self) -> Result<LockGuard, EngineError> {
        let file = self.open_lock_file()?;
        file.lock_exclusive().map_err(EngineError::store)?;
        Ok(LockGuard { file })
    }

    fn open_lock_file(&self) -> Result<File, EngineError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(EngineError::store)
    }

    fn read_project(&self, project_id: &str) -> Result<ProjectFile, EngineError> {
        let path = self.project_path();
        if !path.exists() {
            return Err(EngineError::ProjectNotFound(project_id.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(EngineError::store)?;
        let project: ProjectFile = serde_yaml::from_str(&content).map_err(EngineError::store)?;
        if project.id != project_id {
            return Err(EngineError::ProjectNotFound(project_id.to_string()));
        }
        Ok(project)
    }

    fn write_project(&self, project: &ProjectFile) -> Result<(), EngineError> {
        let yaml = serde_yaml::to_string(project).map_err(EngineError::store)?;
        fs::write(self.project_path(), yaml).map_err(EngineError::store)
    }

    fn read_stages(&self) -> Result<Vec<Stage>, EngineError> {
        let dir = self.stages_dir();
        let mut stages = Vec::new();
        if !dir.exists() {
            return Ok(stages);
        }

        for entry in fs::read_dir(&dir).map_err(EngineError::store)? {
            let entry = entry.map_err(EngineError::store)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(EngineError::store)?;
            let stage = parse_stage_from_markdown(&content).map_err(|e| {
                EngineError::Store(format!("failed to parse {}: {e}", path.display()))
            })?;
            stages.push(stage);
        }

        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    fn find_stage_file(&self, stage_id: &str) -> Result<Option<PathBuf>, EngineError> {
        let dir = self.stages_dir();
        if !dir.exists() {
            return Ok(None);
        }

        let plain = format!("{stage_id}.md");
        let suffix = format!("-{stage_id}.md");
        for entry in fs::read_dir(&dir).map_err(EngineError::store)? {
            let entry = entry.map_err(EngineError::store)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == plain {
                return Ok(Some(entry.path()));
            }
            // Prefixed form: the part before "-{id}.md" must be the numeric
            // order prefix, so "01-prep.md" matches "prep" but
            // "02-sample-prep.md" does not.
            if let Some(prefix) = name.strip_suffix(&suffix) {
                if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }

    /// Write a stage file, renaming if the stage's order (and therefore its
    /// filename prefix) changed.
    fn write_stage(&self, stage: &Stage) -> Result<(), EngineError> {
        let dir = self.stages_dir();
        fs::create_dir_all(&dir).map_err(EngineError::store)?;

        let target = dir.join(format!("{:02}-{}.md", stage.order, stage.id));
        if let Some(existing) = self.find_stage_file(&stage.id)? {
            if existing != target {
                fs::remove_file(&existing).map_err(EngineError::store)?;
            }
        }

        let content = serialize_stage_to_markdown(stage)?;
        fs::write(&target, content).map_err(EngineError::store)
    }

    fn append_record(&self, record: &TransitionRecord) -> Result<(), EngineError> {
        let line = serde_json::to_string(record).map_err(EngineError::store)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .map_err(EngineError::store)?;
        writeln!(file, "{line}").map_err(EngineError::store)
    }

    fn read_history(&self) -> Result<Vec<TransitionRecord>, EngineError> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(EngineError::store)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(EngineError::store))
            .collect()
    }
}

impl StageStore for FileStore {
    fn init_project(&self, meta: ProjectMeta) -> Result<(), EngineError> {
        if self.project_path().exists() {
            return Err(EngineError::Store(format!(
                "workspace already initialized at {}",
                self.root.display()
            )));
        }
        fs::create_dir_all(self.stages_dir()).map_err(EngineError::store)?;

        let _guard = self.lock_exclusive()?;
        self.write_project(&ProjectFile {
            id: meta.id,
            name: meta.name,
            created_at: meta.created_at,
            version: 0,
        })
    }

    fn project_meta(&self, project_id: &str) -> Result<ProjectMeta, EngineError> {
        let _guard = self.lock_shared()?;
        let project = self.read_project(project_id)?;
        Ok(ProjectMeta {
            id: project.id,
            name: project.name,
            created_at: project.created_at,
        })
    }

    fn snapshot(&self, project_id: &str) -> Result<GraphSnapshot, EngineError> {
        let _guard = self.lock_shared()?;
        let project = self.read_project(project_id)?;
        let stages = self.read_stages()?;
        Ok(GraphSnapshot {
            stages,
            version: project.version,
        })
    }

    fn insert_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError> {
        let _guard = self.lock_exclusive()?;
        let mut project = self.read_project(project_id)?;

        if self.find_stage_file(&stage.id)?.is_some() {
            return Err(EngineError::Store(format!(
                "stage '{}' already exists in project '{project_id}'",
                stage.id
            )));
        }

        self.write_stage(&stage)?;
        project.version += 1;
        self.write_project(&project)
    }

    fn update_stage(&self, project_id: &str, stage: Stage) -> Result<(), EngineError> {
        let _guard = self.lock_exclusive()?;
        let mut project = self.read_project(project_id)?;

        if self.find_stage_file(&stage.id)?.is_none() {
            return Err(EngineError::StageNotFound {
                project_id: project_id.to_string(),
                stage_id: stage.id.clone(),
            });
        }

        self.write_stage(&stage)?;
        project.version += 1;
        self.write_project(&project)
    }

    fn remove_stage(&self, project_id: &str, stage_id: &str) -> Result<(), EngineError> {
        let _guard = self.lock_exclusive()?;
        let mut project = self.read_project(project_id)?;

        let Some(path) = self.find_stage_file(stage_id)? else {
            return Err(EngineError::StageNotFound {
                project_id: project_id.to_string(),
                stage_id: stage_id.to_string(),
            });
        };

        let references = self
            .read_history()?
            .iter()
            .filter(|r| r.references_stage(stage_id))
            .count();
        if references > 0 {
            return Err(EngineError::StageReferencedByHistory {
                stage_id: stage_id.to_string(),
                records: references,
            });
        }

        fs::remove_file(path).map_err(EngineError::store)?;
        project.version += 1;
        self.write_project(&project)
    }

    fn apply_transition(
        &self,
        project_id: &str,
        expected_version: u64,
        from: Stage,
        to: Stage,
        record: TransitionRecord,
    ) -> Result<(), EngineError> {
        let _guard = self.lock_exclusive()?;
        let mut project = self.read_project(project_id)?;

        if project.version != expected_version {
            return Err(EngineError::ConcurrentTransitionConflict {
                project_id: project_id.to_string(),
                expected: expected_version,
                actual: project.version,
            });
        }
        for stage in [&from, &to] {
            if self.find_stage_file(&stage.id)?.is_none() {
                return Err(EngineError::StageNotFound {
                    project_id: project_id.to_string(),
                    stage_id: stage.id.clone(),
                });
            }
        }

        self.write_stage(&from)?;
        self.write_stage(&to)?;
        self.append_record(&record)?;
        project.version += 1;
        self.write_project(&project)
    }

    fn history(&self, project_id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        let _guard = self.lock_shared()?;
        self.read_project(project_id)?;
        self.read_history()
    }
}

/// Parse a Stage from markdown with YAML frontmatter.
fn parse_stage_from_markdown(content: &str) -> Result<Stage, EngineError> {
    let rest = content
        .strip_prefix("---\n")
        .ok_or_else(|| EngineError::Store("missing YAML frontmatter".to_string()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| EngineError::Store("unterminated YAML frontmatter".to_string()))?;
    serde_yaml::from_str(&rest[..end]).map_err(EngineError::store)
}

/// Serialize a Stage to markdown with YAML frontmatter and a human-readable
/// body. The body is informational; only the frontmatter is parsed back.
fn serialize_stage_to_markdown(stage: &Stage) -> Result<String, EngineError> {
    let yaml = serde_yaml::to_string(stage).map_err(EngineError::store)?;

    let mut content = String::new();
    content.push_str("---\n");
    content.push_str(&yaml);
    content.push_str("---\n\n");

    content.push_str(&format!("# Stage: {}\n\n", stage.name));
    content.push_str(&format!("**Status**: {}\n\n", stage.status));

    if !stage.prerequisites.is_empty() {
        content.push_str("## Prerequisites\n\n");
        for prerequisite in &stage.prerequisites {
            content.push_str(&format!("- {prerequisite}\n"));
        }
        content.push('\n');
    }

    if !stage.deliverables.is_empty() {
        content.push_str("## Deliverables\n\n");
        for deliverable in &stage.deliverables {
            content.push_str(&format!("- [ ] {deliverable}\n"));
        }
        content.push('\n');
    }

    Ok(content)
}
