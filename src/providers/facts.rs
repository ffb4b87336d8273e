//! File-backed fact providers
//!
//! A workspace carries its collaborator data (tasks, quality issues,
//! approvals, documents) in a `facts.yaml` file. `SharedFacts` wraps the
//! parsed facts behind the provider traits so the CLI and tests run genuine
//! queries against real state instead of mocked randomness.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

use super::{
    ApprovalProvider, ApprovalState, DocumentState, DocumentStatusProvider, ProviderError,
    QualityIssueProvider, TaskStatusProvider,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFact {
    pub stage_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssueFact {
    pub stage_id: String,
    pub description: String,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalFact {
    pub stage_id: String,
    pub approver: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFact {
    pub stage_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub exists: bool,
    #[serde(default)]
    pub reviewed: bool,
}

fn default_true() -> bool {
    true
}

/// Everything the workspace knows about its external collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceFacts {
    #[serde(default)]
    pub tasks: Vec<TaskFact>,
    #[serde(default)]
    pub quality_issues: Vec<QualityIssueFact>,
    #[serde(default)]
    pub approvals: Vec<ApprovalFact>,
    #[serde(default)]
    pub documents: Vec<DocumentFact>,
}

impl WorkspaceFacts {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read facts file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse facts file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize facts")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write facts file: {}", path.display()))
    }
}

/// Thread-safe handle over workspace facts, implementing all four provider
/// traits. Clones share the same underlying data, so a test can mark a task
/// complete and re-evaluate through the same engine.
#[derive(Debug, Clone, Default)]
pub struct SharedFacts {
    inner: Arc<RwLock<WorkspaceFacts>>,
}

impl SharedFacts {
    pub fn new(facts: WorkspaceFacts) -> Self {
        Self {
            inner: Arc::new(RwLock::new(facts)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(WorkspaceFacts::load(path)?))
    }

    /// Mutate the underlying facts in place.
    pub fn update(&self, f: impl FnOnce(&mut WorkspaceFacts)) {
        let mut facts = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut facts);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, WorkspaceFacts> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStatusProvider for SharedFacts {
    fn outstanding_tasks(
        &self,
        _project_id: &str,
        stage_id: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let facts = self.read();
        Ok(facts
            .tasks
            .iter()
            .filter(|t| t.stage_id == stage_id && t.required && !t.completed)
            .map(|t| t.name.clone())
            .collect())
    }
}

impl QualityIssueProvider for SharedFacts {
    fn open_issues(&self, _project_id: &str, stage_id: &str) -> Result<usize, ProviderError> {
        let facts = self.read();
        Ok(facts
            .quality_issues
            .iter()
            .filter(|i| i.stage_id == stage_id && !i.resolved)
            .count())
    }
}

impl ApprovalProvider for SharedFacts {
    fn approval(&self, _project_id: &str, stage_id: &str) -> Result<ApprovalState, ProviderError> {
        let facts = self.read();
        let record = facts
            .approvals
            .iter()
            .find(|a| a.stage_id == stage_id)
            .ok_or_else(|| {
                ProviderError::Unavailable(format!("no approver designated for stage '{stage_id}'"))
            })?;

        if record.approved {
            Ok(ApprovalState::Approved {
                approver: record.approver.clone(),
                at: record.approved_at.unwrap_or_else(Utc::now),
            })
        } else {
            Ok(ApprovalState::Pending {
                approver: record.approver.clone(),
            })
        }
    }
}

impl DocumentStatusProvider for SharedFacts {
    fn document(
        &self,
        _project_id: &str,
        stage_id: &str,
        name: &str,
    ) -> Result<DocumentState, ProviderError> {
        let facts = self.read();
        match facts
            .documents
            .iter()
            .find(|d| d.stage_id == stage_id && d.name == name)
        {
            Some(doc) => Ok(DocumentState {
                name: doc.name.clone(),
                exists: doc.exists,
                reviewed: doc.reviewed,
            }),
            // A deliverable the document store has never seen does not exist.
            None => Ok(DocumentState {
                name: name.to_string(),
                exists: false,
                reviewed: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_facts() -> WorkspaceFacts {
        WorkspaceFacts {
            tasks: vec![
                TaskFact {
                    stage_id: "prep".to_string(),
                    name: "calibrate equipment".to_string(),
                    required: true,
                    completed: true,
                },
                TaskFact {
                    stage_id: "prep".to_string(),
                    name: "order reagents".to_string(),
                    required: true,
                    completed: false,
                },
                TaskFact {
                    stage_id: "prep".to_string(),
                    name: "tidy bench".to_string(),
                    required: false,
                    completed: false,
                },
            ],
            quality_issues: vec![QualityIssueFact {
                stage_id: "prep".to_string(),
                description: "sample 12 contaminated".to_string(),
                resolved: false,
            }],
            approvals: vec![ApprovalFact {
                stage_id: "prep".to_string(),
                approver: "qa-lead".to_string(),
                approved: false,
                approved_at: None,
            }],
            documents: vec![DocumentFact {
                stage_id: "prep".to_string(),
                name: "sop-draft".to_string(),
                exists: true,
                reviewed: false,
            }],
        }
    }

    #[test]
    fn test_outstanding_tasks_filters_required_incomplete() {
        let facts = SharedFacts::new(sample_facts());
        let outstanding = facts.outstanding_tasks("p", "prep").expect("Should query");
        assert_eq!(outstanding, vec!["order reagents"]);
    }

    #[test]
    fn test_open_issue_count() {
        let facts = SharedFacts::new(sample_facts());
        assert_eq!(facts.open_issues("p", "prep").expect("Should query"), 1);
        assert_eq!(facts.open_issues("p", "other").expect("Should query"), 0);
    }

    #[test]
    fn test_approval_pending_names_approver() {
        let facts = SharedFacts::new(sample_facts());
        match facts.approval("p", "prep").expect("Should query") {
            ApprovalState::Pending { approver } => assert_eq!(approver, "qa-lead"),
            other => panic!("Expected pending approval, got {other:?}"),
        }
    }

    #[test]
    fn test_approval_missing_record_is_unavailable() {
        let facts = SharedFacts::new(sample_facts());
        assert!(facts.approval("p", "other").is_err());
    }

    #[test]
    fn test_unknown_document_does_not_exist() {
        let facts = SharedFacts::new(sample_facts());
        let doc = facts
            .document("p", "prep", "final-report")
            .expect("Should query");
        assert!(!doc.exists);
        assert!(!doc.is_accepted());
    }

    #[test]
    fn test_update_is_visible_to_clones() {
        let facts = SharedFacts::new(sample_facts());
        let handle = facts.clone();

        handle.update(|f| {
            for task in &mut f.tasks {
                task.completed = true;
            }
        });

        assert!(facts
            .outstanding_tasks("p", "prep")
            .expect("Should query")
            .is_empty());
    }

    #[test]
    fn test_facts_yaml_roundtrip() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("facts.yaml");

        sample_facts().save(&path).expect("Should save");
        let loaded = WorkspaceFacts::load(&path).expect("Should load");

        assert_eq!(loaded.tasks.len(), 3);
        assert_eq!(loaded.documents[0].name, "sop-draft");
    }
}
