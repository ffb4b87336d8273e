//! Workflow template schema
//!
//! A template is a YAML document describing a project's stage sequence and
//! the conditions guarding each edge. Projects are provisioned from a
//! validated template; after that the template plays no further role.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{Stage, TransitionCondition};

/// Root structure of a workflow template file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub project: ProjectSection,
    pub stages: Vec<StageTemplate>,
    #[serde(default)]
    pub conditions: Vec<EdgeTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTemplate {
    pub id: String,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub estimated_duration_days: Option<u32>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

/// Condition set for one (from, to) edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTemplate {
    pub from: String,
    pub to: String,
    pub conditions: Vec<TransitionCondition>,
}

/// A problem found while validating a template, with optional stage context.
#[derive(Debug)]
pub struct TemplateIssue {
    pub message: String,
    pub stage_id: Option<String>,
}

impl std::fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(id) = &self.stage_id {
            write!(f, "Stage '{}': {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl WorkflowTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow template YAML")
    }

    /// Validate the template's structure. Returns every issue found rather
    /// than stopping at the first.
    pub fn validate(&self) -> Vec<TemplateIssue> {
        let mut issues = Vec::new();

        if self.stages.is_empty() {
            issues.push(TemplateIssue {
                message: "template defines no stages".to_string(),
                stage_id: None,
            });
        }

        let mut seen_ids = BTreeSet::new();
        let mut seen_orders = BTreeSet::new();
        for stage in &self.stages {
            if !seen_ids.insert(stage.id.as_str()) {
                issues.push(TemplateIssue {
                    message: "duplicate stage id".to_string(),
                    stage_id: Some(stage.id.clone()),
                });
            }
            if stage.order == 0 {
                issues.push(TemplateIssue {
                    message: "stage order must start at 1".to_string(),
                    stage_id: Some(stage.id.clone()),
                });
            } else if !seen_orders.insert(stage.order) {
                issues.push(TemplateIssue {
                    message: format!("duplicate stage order {}", stage.order),
                    stage_id: Some(stage.id.clone()),
                });
            }
        }

        for edge in &self.conditions {
            let from = self.stages.iter().find(|s| s.id == edge.from);
            let to = self.stages.iter().find(|s| s.id == edge.to);

            match (from, to) {
                (None, _) | (_, None) => {
                    issues.push(TemplateIssue {
                        message: format!(
                            "condition edge '{}' -> '{}' references an unknown stage",
                            edge.from, edge.to
                        ),
                        stage_id: None,
                    });
                }
                (Some(from), Some(to)) if to.order != from.order + 1 => {
                    issues.push(TemplateIssue {
                        message: format!(
                            "condition edge '{}' -> '{}' is not sequential",
                            edge.from, edge.to
                        ),
                        stage_id: None,
                    });
                }
                _ => {}
            }

            for (i, condition) in edge.conditions.iter().enumerate() {
                if edge.conditions[..i].iter().any(|c| c.id == condition.id) {
                    issues.push(TemplateIssue {
                        message: format!(
                            "condition id '{}' appears twice on edge '{}' -> '{}'",
                            condition.id, edge.from, edge.to
                        ),
                        stage_id: None,
                    });
                }
            }
        }

        issues
    }

    /// Materialize the template's stages for the project.
    pub fn build_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .map(|t| {
                let mut stage = Stage::new(
                    self.project.id.clone(),
                    t.id.clone(),
                    t.order,
                    t.name.clone(),
                );
                stage.estimated_duration_days = t.estimated_duration_days;
                for prerequisite in &t.prerequisites {
                    stage.add_prerequisite(prerequisite.clone());
                }
                for deliverable in &t.deliverables {
                    stage.add_deliverable(deliverable.clone());
                }
                stage
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionType;

    const SAMPLE: &str = r#"
project:
  id: assay-2026
  name: Assay Validation
stages:
  - id: prep
    name: Preparation
    order: 1
    estimated_duration_days: 10
    deliverables:
      - sop-draft
  - id: validation
    name: Method Validation
    order: 2
    prerequisites:
      - equipment-calibrated
  - id: filing
    name: Registration Filing
    order: 3
conditions:
  - from: prep
    to: validation
    conditions:
      - id: prep-tasks
        name: All preparation tasks complete
        type: task-completion
      - id: prep-signoff
        name: QA sign-off
        type: approval
        required: false
"#;

    #[test]
    fn test_parse_sample_template() {
        let template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");

        assert_eq!(template.project.id, "assay-2026");
        assert_eq!(template.stages.len(), 3);
        assert_eq!(template.conditions.len(), 1);

        let edge = &template.conditions[0];
        assert_eq!(edge.conditions[0].condition_type, ConditionType::TaskCompletion);
        assert!(edge.conditions[0].required);
        assert!(!edge.conditions[1].required);
    }

    #[test]
    fn test_sample_template_is_valid() {
        let template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");
        assert!(template.validate().is_empty());
    }

    #[test]
    fn test_build_stages_carries_metadata() {
        let template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");
        let stages = template.build_stages();

        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].project_id, "assay-2026");
        assert_eq!(stages[0].estimated_duration_days, Some(10));
        assert_eq!(stages[0].deliverables, vec!["sop-draft"]);
        assert!(stages[1].prerequisites.contains("equipment-calibrated"));
    }

    #[test]
    fn test_duplicate_order_reported() {
        let mut template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");
        template.stages[2].order = 2;

        let issues = template.validate();
        assert!(issues.iter().any(|i| i.message.contains("duplicate stage order 2")));
    }

    #[test]
    fn test_non_sequential_condition_edge_reported() {
        let mut template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");
        template.conditions[0].to = "filing".to_string();

        let issues = template.validate();
        assert!(issues.iter().any(|i| i.message.contains("not sequential")));
    }

    #[test]
    fn test_unknown_edge_stage_reported() {
        let mut template = WorkflowTemplate::parse(SAMPLE).expect("Should parse");
        template.conditions[0].from = "ghost".to_string();

        let issues = template.validate();
        assert!(issues.iter().any(|i| i.message.contains("unknown stage")));
    }

    #[test]
    fn test_empty_template_reported() {
        let template = WorkflowTemplate {
            project: ProjectSection {
                id: "p".to_string(),
                name: "P".to_string(),
            },
            stages: Vec::new(),
            conditions: Vec::new(),
        };

        let issues = template.validate();
        assert!(issues.iter().any(|i| i.message.contains("no stages")));
    }
}
