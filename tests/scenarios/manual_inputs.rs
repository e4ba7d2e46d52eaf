//! Test: manual runs with inputs behave like push runs

use crate::helpers::*;
use sitepipe::core::config::WorkflowConfig;
use sitepipe::core::{ManualInputs, StageKind, Trigger, TriggerKind};
use sitepipe::execution::RunError;
use sitepipe::persistence::{InMemoryPersistence, PersistenceBackend};
use std::sync::Arc;

/// Inputs are recorded but do not change which stages run
#[tokio::test]
async fn test_manual_run_records_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = dispatcher(WORKFLOW, MockStages::new(), dir.path(), history.clone());

    let inputs = ManualInputs {
        log_level: "debug".to_string(),
        tags: "smoke".to_string(),
    };
    let run = dispatcher
        .dispatch(Trigger::manual("main", inputs))
        .await
        .unwrap();

    assert_run_succeeded(&run);
    assert_eq!(
        dispatcher
            .engine()
            .stages()
            .invocations()
            .iter()
            .map(|i| i.stage)
            .collect::<Vec<_>>(),
        StageKind::ALL.to_vec()
    );

    let summary = history.load_run(run.id()).await.unwrap().unwrap();
    assert_eq!(summary.trigger, TriggerKind::Manual);
    assert_eq!(summary.git_ref, "refs/heads/main");
    assert_eq!(summary.inputs.get("log_level").map(String::as_str), Some("debug"));
    assert_eq!(summary.inputs.get("tags").map(String::as_str), Some("smoke"));
}

/// Arbitrary inputs run the same stages and publish the same commit as the defaults
#[tokio::test]
async fn test_arbitrary_inputs_match_defaults() {
    let config = WorkflowConfig::from_yaml(WORKFLOW).unwrap();
    let defaults = ManualInputs::resolve(&config.manual_inputs(), None, None);
    let arbitrary = ManualInputs::resolve(
        &config.manual_inputs(),
        Some("no-such-level".to_string()),
        Some("a,b;c d".to_string()),
    );

    let mut outcomes = Vec::new();
    for inputs in [defaults, arbitrary] {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(
            WORKFLOW,
            MockStages::new(),
            dir.path(),
            Arc::new(InMemoryPersistence::new()),
        );
        let run = dispatcher
            .dispatch(Trigger::manual("main", inputs))
            .await
            .unwrap();
        assert_run_succeeded(&run);

        let stages = dispatcher.engine().stages();
        outcomes.push((stages.invocations(), stages.published(), run.state.sha.clone()));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].1, vec!["head".to_string()]);
}

/// Manual and push runs of the same ref share a concurrency group
#[test]
fn test_manual_and_push_share_group() {
    let config = WorkflowConfig::from_yaml(WORKFLOW).unwrap();
    let inputs = ManualInputs::resolve(&config.manual_inputs(), None, None);
    assert_eq!(inputs.log_level, "warning");
    assert_eq!(inputs.tags, "");

    let manual = config.to_run(Trigger::manual("main", inputs));
    let push = config.to_run(Trigger::push("main", None));
    assert_eq!(manual.group, push.group);
}

/// Workflows without a manual trigger reject manual runs
#[tokio::test]
async fn test_manual_trigger_not_configured() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
name: "Deploy"
on:
  push:
    branches: ["main"]
source:
  repository: "https://example.com/owner/blog.git"
generator: {}
publish:
  repository: "https://example.com/owner/site.git"
"#;
    let config = WorkflowConfig::from_yaml(yaml).unwrap();
    assert!(config.triggers.manual.is_none());

    let dispatcher = dispatcher(
        yaml,
        MockStages::new(),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    );
    let inputs = ManualInputs::resolve(&config.manual_inputs(), None, None);
    let err = dispatcher
        .dispatch(Trigger::manual("main", inputs))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::NotAccepted {
            trigger: TriggerKind::Manual,
            ..
        }
    ));
}
