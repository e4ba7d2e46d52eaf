//! Test: a failed stage ends the run and nothing is published

use crate::helpers::*;
use sitepipe::core::{RunStatus, StageKind, Trigger};
use sitepipe::execution::RunError;
use sitepipe::persistence::{InMemoryPersistence, PersistenceBackend};
use std::sync::Arc;

/// Build failure never reaches publish and is recorded in history
#[tokio::test]
async fn test_build_failure_never_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = dispatcher(
        WORKFLOW,
        MockStages::failing_at(StageKind::Build),
        dir.path(),
        history.clone(),
    );

    let run = dispatcher.dispatch(Trigger::push("main", None)).await.unwrap();

    assert_run_failed_at(&run, StageKind::Build);
    assert!(dispatcher.engine().stages().published().is_empty());
    assert!(run.state.error.as_deref().unwrap().contains("output directory"));

    let summary = history.load_run(run.id()).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.failed_stage, Some(StageKind::Build));
    assert_eq!(summary.sha.as_deref(), Some("head"));
}

/// Checkout failure skips build and publish
#[tokio::test]
async fn test_checkout_failure_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher(
        WORKFLOW,
        MockStages::failing_at(StageKind::Checkout),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    );

    let run = dispatcher.dispatch(Trigger::push("main", None)).await.unwrap();

    assert_run_failed_at(&run, StageKind::Checkout);
    assert_eq!(run.invoked_stages(), vec![StageKind::Checkout]);
    assert!(run.state.sha.is_none());
}

/// The lane is released after a failure
#[tokio::test]
async fn test_failure_releases_lane() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher(
        WORKFLOW,
        MockStages::failing_at(StageKind::Publish),
        dir.path(),
        Arc::new(InMemoryPersistence::new()),
    );

    let run = dispatcher.dispatch(Trigger::push("main", None)).await.unwrap();

    assert_run_failed_at(&run, StageKind::Publish);
    assert_eq!(dispatcher.controller().active_run(&run.group), None);
}

/// Pushes to branches outside the trigger list do not start a run
#[tokio::test]
async fn test_push_to_other_branch_is_not_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(InMemoryPersistence::new());
    let dispatcher = dispatcher(WORKFLOW, MockStages::new(), dir.path(), history.clone());

    let err = dispatcher
        .dispatch(Trigger::push("feature", None))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::NotAccepted { .. }));
    assert!(dispatcher.engine().stages().invocations().is_empty());
    assert!(history.list_workflows().await.unwrap().is_empty());
}
