//! End-to-end tests over a file-backed workspace, exercising the same path
//! the CLI takes: init from a template, reopen, evaluate, commit, reload.

use std::path::Path;

use stagegate::commands::workspace;
use stagegate::models::{StageStatus, TransitionKind};
use stagegate::providers::facts::{TaskFact, WorkspaceFacts};
use stagegate::template::WorkflowTemplate;
use tempfile::TempDir;

const TEMPLATE: &str = r#"
project:
  id: assay-2026
  name: Assay Validation
stages:
  - id: prep
    name: Preparation
    order: 1
    deliverables:
      - sop-draft
  - id: validation
    name: Method Validation
    order: 2
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
"#;

fn init_workspace(root: &Path) {
    use stagegate::engine::Engine;
    use stagegate::gate::{EvaluationContext, GateConfig};
    use stagegate::providers::facts::SharedFacts;
    use stagegate::store::FileStore;
    use std::sync::Arc;

    let template = WorkflowTemplate::parse(TEMPLATE).expect("Should parse template");
    assert!(template.validate().is_empty());

    let facts = SharedFacts::default();
    let context = EvaluationContext::new(
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts.clone()),
        Arc::new(facts),
    );
    let engine = Engine::new(
        Arc::new(FileStore::new(root.to_path_buf())),
        context,
        GateConfig::default(),
    );
    engine
        .provision_project(&template)
        .expect("Should provision project");
    workspace::save_conditions(root, &template.conditions).expect("Should save conditions");
}

fn write_facts(root: &Path, facts: &WorkspaceFacts) {
    facts
        .save(&workspace::facts_path(root))
        .expect("Should save facts");
}

#[test]
fn test_workspace_lifecycle_survives_reopen() {
    let temp = TempDir::new().expect("Should create temp dir");
    let root = temp.path().join(".gate");
    init_workspace(&root);

    write_facts(
        &root,
        &WorkspaceFacts {
            tasks: vec![TaskFact {
                stage_id: "prep".to_string(),
                name: "calibrate spectrometer".to_string(),
                required: true,
                completed: false,
            }],
            ..Default::default()
        },
    );

    // First open: start the project and hit the failing condition.
    {
        let ws = workspace::open(&root).expect("Should open workspace");
        assert_eq!(ws.project_id, "assay-2026");

        ws.engine.start_project(&ws.project_id).expect("Should start");
        let decision = ws
            .engine
            .evaluate_transition(&ws.project_id, "prep", "validation")
            .expect("Should evaluate");
        assert!(!decision.admissible);
    }

    // Fix the task on disk, reopen, and push the transition through.
    write_facts(
        &root,
        &WorkspaceFacts {
            tasks: vec![TaskFact {
                stage_id: "prep".to_string(),
                name: "calibrate spectrometer".to_string(),
                required: true,
                completed: true,
            }],
            ..Default::default()
        },
    );

    {
        let ws = workspace::open(&root).expect("Should reopen workspace");
        let decision = ws
            .engine
            .evaluate_transition(&ws.project_id, "prep", "validation")
            .expect("Should evaluate");
        assert!(decision.admissible);

        ws.engine
            .commit_transition(
                &ws.project_id,
                "prep",
                "validation",
                &decision,
                Some("gate review passed".to_string()),
            )
            .expect("Should commit");
    }

    // Third open: committed state and history survived on disk.
    {
        let ws = workspace::open(&root).expect("Should reopen workspace");
        let graph = ws.engine.stage_graph(&ws.project_id).expect("Should load");

        assert_eq!(graph.stage("prep").unwrap().status, StageStatus::Completed);
        assert_eq!(
            graph.stage("validation").unwrap().status,
            StageStatus::InProgress
        );

        let history = ws.engine.history(&ws.project_id).expect("Should read");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransitionKind::Advance);
        assert_eq!(history[0].notes.as_deref(), Some("gate review passed"));
        assert_eq!(history[0].conditions.len(), 1);
    }
}

#[test]
fn test_block_unblock_and_regress_on_disk() {
    let temp = TempDir::new().expect("Should create temp dir");
    let root = temp.path().join(".gate");
    init_workspace(&root);
    write_facts(&root, &WorkspaceFacts::default());

    let ws = workspace::open(&root).expect("Should open workspace");
    ws.engine.start_project(&ws.project_id).expect("Should start");

    let decision = ws
        .engine
        .evaluate_transition(&ws.project_id, "prep", "validation")
        .expect("Should evaluate");
    ws.engine
        .commit_transition(&ws.project_id, "prep", "validation", &decision, None)
        .expect("Should commit");

    // Stall and recover the active stage.
    ws.engine
        .mark_blocked(&ws.project_id, "validation")
        .expect("Should block");
    let graph = ws.engine.stage_graph(&ws.project_id).expect("Should load");
    assert_eq!(graph.current_stage().unwrap().status, StageStatus::Blocked);

    ws.engine
        .unblock(&ws.project_id, "validation")
        .expect("Should unblock");

    // Authorized regression back to prep.
    ws.engine
        .regress(
            &ws.project_id,
            stagegate::models::Authorization {
                authorized_by: "lab-director".to_string(),
                reason: "method drift discovered".to_string(),
            },
            None,
        )
        .expect("Should regress");

    let reopened = workspace::open(&root).expect("Should reopen workspace");
    let graph = reopened
        .engine
        .stage_graph(&reopened.project_id)
        .expect("Should load");
    assert_eq!(graph.stage("prep").unwrap().status, StageStatus::InProgress);
    assert_eq!(
        graph.stage("validation").unwrap().status,
        StageStatus::NotStarted
    );

    let history = reopened
        .engine
        .history(&reopened.project_id)
        .expect("Should read");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].kind, TransitionKind::Regression);
}

#[test]
fn test_open_missing_workspace_fails_with_hint() {
    let temp = TempDir::new().expect("Should create temp dir");
    let err = workspace::open(&temp.path().join(".gate"))
        .expect_err("Opening an uninitialized workspace must fail");
    assert!(err.to_string().contains("stagegate init"));
}
