//! Test: newer runs in a concurrency group supersede older ones

use crate::helpers::*;
use sitepipe::core::{RunStatus, StageKind, StageState, Trigger};
use sitepipe::persistence::{InMemoryPersistence, PersistenceBackend};
use std::sync::Arc;
use std::time::Duration;

/// A push while a run is building cancels it; only the newer commit is published
#[tokio::test]
async fn test_newer_push_cancels_running_build() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = Arc::new(dispatcher(
        WORKFLOW,
        MockStages::holding_build_of("aaaa"),
        dir.path(),
        history.clone(),
    ));

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(Trigger::push("main", Some("aaaa".to_string())))
                .await
        })
    };
    dispatcher.engine().stages().held.notified().await;

    let second = dispatcher
        .dispatch(Trigger::push("main", Some("bbbb".to_string())))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.status(), RunStatus::Cancelled);
    assert_eq!(first.state.failed_stage, Some(StageKind::Build));
    assert!(matches!(
        first.stage(StageKind::Publish).state,
        StageState::Skipped { .. }
    ));
    assert_run_succeeded(&second);

    let stages = dispatcher.engine().stages();
    assert_eq!(stages.stages_for("aaaa"), vec![StageKind::Checkout, StageKind::Build]);
    assert_eq!(stages.stages_for("bbbb"), StageKind::ALL.to_vec());
    assert_eq!(stages.published(), vec!["bbbb".to_string()]);

    let runs = history.list_runs("Deploy").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().any(|r| r.status == RunStatus::Cancelled));
    assert!(runs.iter().any(|r| r.status == RunStatus::Succeeded));
}

/// The lane is free again once the active run has finished
#[tokio::test]
async fn test_sequential_pushes_both_publish() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher(
        WORKFLOW,
        MockStages::new(),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    );

    let first = dispatcher
        .dispatch(Trigger::push("main", Some("aaaa".to_string())))
        .await
        .unwrap();
    let second = dispatcher
        .dispatch(Trigger::push("main", Some("bbbb".to_string())))
        .await
        .unwrap();

    assert_run_succeeded(&first);
    assert_run_succeeded(&second);
    assert_eq!(
        dispatcher.engine().stages().published(),
        vec!["aaaa".to_string(), "bbbb".to_string()]
    );
    assert_eq!(dispatcher.controller().active_run(&first.group), None);
}

/// Without cancel_in_progress the newer run waits and publishes afterwards
#[tokio::test]
async fn test_queued_run_waits_for_active_run() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(dispatcher(
        &queued_workflow(),
        MockStages::holding_build_of("aaaa"),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    ));

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(Trigger::push("main", Some("aaaa".to_string())))
                .await
        })
    };
    dispatcher.engine().stages().held.notified().await;

    let second = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(Trigger::push("main", Some("bbbb".to_string())))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dispatcher.engine().stages().stages_for("bbbb").is_empty());

    dispatcher.engine().stages().release.notify_one();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_run_succeeded(&first);
    assert_run_succeeded(&second);
    assert_eq!(
        dispatcher.engine().stages().published(),
        vec!["aaaa".to_string(), "bbbb".to_string()]
    );
}

/// Different branches land in different groups and do not interfere
#[tokio::test]
async fn test_other_branch_runs_alongside() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = WORKFLOW.replace(r#"branches: ["main"]"#, r#"branches: ["main", "preview"]"#);
    let dispatcher = Arc::new(dispatcher(
        &yaml,
        MockStages::holding_build_of("aaaa"),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    ));

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(Trigger::push("main", Some("aaaa".to_string())))
                .await
        })
    };
    dispatcher.engine().stages().held.notified().await;

    let preview = dispatcher
        .dispatch(Trigger::push("preview", Some("cccc".to_string())))
        .await
        .unwrap();
    assert_run_succeeded(&preview);

    dispatcher.engine().stages().release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_run_succeeded(&first);
    assert_ne!(first.group, preview.group);
}
