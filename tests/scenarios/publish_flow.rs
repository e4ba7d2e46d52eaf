//! Test: event stream and history of successful runs

use crate::helpers::*;
use sitepipe::core::{RunStatus, StageKind, Trigger};
use sitepipe::execution::RunEvent;
use sitepipe::persistence::{InMemoryPersistence, PersistenceBackend};
use std::sync::{Arc, Mutex};

/// Events arrive in stage order and end with the final status
#[tokio::test]
async fn test_event_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher(
        WORKFLOW,
        MockStages::new(),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    dispatcher
        .engine()
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let run = dispatcher
        .dispatch(Trigger::push("main", Some("abc123".to_string())))
        .await
        .unwrap();
    assert_run_succeeded(&run);

    let events = events.lock().unwrap();
    let started: Vec<StageKind> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(started, StageKind::ALL.to_vec());

    match events.first() {
        Some(RunEvent::RunStarted { git_ref, group, .. }) => {
            assert_eq!(git_ref, "refs/heads/main");
            assert_eq!(group, "Deploy-refs/heads/main");
        }
        other => panic!("unexpected first event: {:?}", other),
    }
    assert!(matches!(
        events.last(),
        Some(RunEvent::RunCompleted {
            status: RunStatus::Succeeded,
            ..
        })
    ));
}

/// The commit resolved by checkout is the one published and recorded
#[tokio::test]
async fn test_resolved_commit_flows_to_publish() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = dispatcher(WORKFLOW, MockStages::new(), dir.path(), history.clone());

    let run = dispatcher.dispatch(Trigger::push("main", None)).await.unwrap();

    assert_run_succeeded(&run);
    assert_eq!(run.state.sha.as_deref(), Some("head"));
    assert_eq!(run.metadata.get("sha").map(String::as_str), Some("head"));
    assert_eq!(dispatcher.engine().stages().published(), vec!["head".to_string()]);

    let summary = history.load_run(run.id()).await.unwrap().unwrap();
    assert_eq!(summary.sha.as_deref(), Some("head"));
    assert!(summary.inputs.is_empty());
    assert!(summary.completed_at.is_some());
}

/// History lists the newest run first
#[tokio::test]
async fn test_history_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = dispatcher(WORKFLOW, MockStages::new(), dir.path(), history.clone());

    let first = dispatcher
        .dispatch(Trigger::push("main", Some("aaaa".to_string())))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = dispatcher
        .dispatch(Trigger::push("main", Some("bbbb".to_string())))
        .await
        .unwrap();

    let runs = history.list_runs("Deploy").await.unwrap();
    let ids: Vec<_> = runs.iter().map(|r| r.run_id).collect();
    assert_eq!(ids, vec![second.id(), first.id()]);
    assert_eq!(history.list_workflows().await.unwrap(), vec!["Deploy".to_string()]);
}
