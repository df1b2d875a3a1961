//! Stop semantics: once a session is stopped its strategy writes nothing.

use std::sync::Arc;
use std::time::Duration;

use workflow_sync::backend::RemoteStatus;
use workflow_sync::clock::SystemClock;
use workflow_sync::models::{AgentStatus, LogLevel, RunState};
use workflow_sync::orchestrator::session_controller::{SessionController, StartOutcome};
use workflow_sync::orchestrator::Terminal;
use workflow_sync::store::StateStore;
use workflow_sync::AppError;

use super::test_helpers::{
    controller_with, fallback_controller, fast_settings, messages, remote_log, terminal,
    ScriptedBackend, T0,
};

fn real_time_controller(backend: ScriptedBackend) -> (SessionController, Arc<StateStore>) {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(StateStore::new(clock.clone()));
    let controller = SessionController::new(
        Arc::new(backend),
        Arc::clone(&store),
        clock,
        fast_settings(60),
    );
    (controller, store)
}

#[tokio::test]
async fn stop_while_awaiting_poll_appends_nothing_afterwards() {
    let backend = Arc::new(
        ScriptedBackend::accepting("wf-1")
            .push_status(terminal(RemoteStatus::Completed, AgentStatus::Completed))
            .push_logs(vec![remote_log(T0 + 5, "remote progress")])
            .hold_polls(),
    );
    let (controller, store, _) = controller_with(Arc::clone(&backend), fast_settings(60));

    controller.start("Analyze total revenue", "revenue-aov").await;
    backend.poll_entered.notified().await;

    controller.stop().await;
    let stopped = store.snapshot();
    backend.poll_release.notify_one();

    assert!(matches!(controller.wait().await, Some(Err(AppError::Cancelled))));
    let snapshot = store.snapshot();
    assert_eq!(snapshot, stopped);
    assert_eq!(snapshot.run_state, RunState::Idle);
    assert!(snapshot.workflow_status.is_all(AgentStatus::Idle));
    let last = snapshot.logs.last().expect("logs");
    assert_eq!(last.level, LogLevel::Warning);
    assert_eq!(last.message, "Workflow stopped");
}

#[tokio::test(start_paused = true)]
async fn stop_mid_simulation_halts_further_stages() {
    let (controller, store) = real_time_controller(ScriptedBackend::unreachable());

    controller.start("Analyze total revenue", "revenue-aov").await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    controller.stop().await;
    let stopped = store.snapshot();

    assert!(matches!(controller.wait().await, Some(Err(AppError::Cancelled))));
    tokio::time::sleep(Duration::from_secs(30)).await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot, stopped);
    assert!(snapshot.workflow_status.is_all(AgentStatus::Idle));
    let logged = messages(&store);
    assert_eq!(logged.last().map(String::as_str), Some("Workflow stopped"));
    assert!(!logged.iter().any(|m| m == "Workflow completed successfully"));
    assert!(logged.iter().any(|m| m == "Orchestrator: request classified"));
    assert!(!logged.iter().any(|m| m.starts_with("DuckDB tool: SQL query")));
}

#[tokio::test(start_paused = true)]
async fn stop_during_workflow_creation_aborts_the_start() {
    let (controller, store) = real_time_controller(ScriptedBackend::hanging());

    let (outcome, ()) = tokio::join!(
        controller.start("Analyze total revenue", "revenue-aov"),
        async {
            tokio::task::yield_now().await;
            controller.stop().await;
        }
    );

    assert!(matches!(outcome, StartOutcome::Aborted { .. }));
    assert_eq!(
        messages(&store),
        vec!["Starting analysis: Analyze total revenue", "Workflow stopped"]
    );
    assert!(store.snapshot().strategy.is_none());
    assert!(controller.wait().await.is_none());
}

#[tokio::test]
async fn restart_after_stop_is_not_disturbed_by_the_old_run() {
    let (controller, store, _) = fallback_controller();

    controller.start("first", "revenue-aov").await;
    // Let the first replay reach its first delay.
    tokio::task::yield_now().await;
    controller.stop().await;

    let outcome = controller.start("second", "revenue-aov").await;
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    assert!(matches!(controller.wait().await, Some(Ok(Terminal::Completed))));

    let logged = messages(&store);
    let count = |needle: &str| logged.iter().filter(|m| *m == needle).count();
    assert_eq!(count("Workflow stopped"), 1);
    assert_eq!(count("Orchestrator: classification started"), 2);
    assert_eq!(count("Workflow completed successfully"), 1);
    assert!(store.snapshot().workflow_status.is_all(AgentStatus::Completed));
}

#[tokio::test]
async fn repeated_stops_each_log_once() {
    let (controller, store, _) = fallback_controller();

    controller.stop().await;
    controller.stop().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.logs.len(), 2);
    assert!(snapshot
        .logs
        .iter()
        .all(|entry| entry.level == LogLevel::Warning));
}
