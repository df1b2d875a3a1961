//! State store guard, cancellation and notification behaviour.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use workflow_sync::clock::ManualClock;
use workflow_sync::models::{Agent, AgentStatus, LogEntry, LogLevel, RunState};
use workflow_sync::store::{LogCursor, StateStore};

fn store() -> (StateStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    (StateStore::new(clock.clone()), clock)
}

fn announce() -> LogEntry {
    LogEntry::system(LogLevel::Info, "Starting analysis")
}

#[test]
fn new_store_is_idle_and_empty() {
    let (store, _) = store();
    let snapshot = store.snapshot();

    assert!(!store.is_running());
    assert_eq!(snapshot.run_state, RunState::Idle);
    assert!(snapshot.logs.is_empty());
    assert!(snapshot.id.is_empty());
}

#[test]
fn begin_starts_a_session_and_stamps_the_announcement() {
    let (store, _) = store();

    assert!(store.begin("s-1", "Analyze revenue", "revenue-aov", announce()));

    let snapshot = store.snapshot();
    assert!(store.is_running());
    assert_eq!(snapshot.id, "s-1");
    assert_eq!(snapshot.query, "Analyze revenue");
    assert_eq!(snapshot.demo_id, "revenue-aov");
    assert_eq!(snapshot.logs.len(), 1);
    assert_eq!(snapshot.logs[0].timestamp, 1_000);
}

#[test]
fn begin_while_running_is_a_no_op() {
    let (store, _) = store();
    assert!(store.begin("s-1", "first", "d", announce()));

    assert!(!store.begin("s-2", "second", "d", announce()));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.id, "s-1");
    assert_eq!(snapshot.query, "first");
    assert_eq!(snapshot.logs.len(), 1);
}

#[test]
fn begin_after_terminal_state_succeeds() {
    let (store, _) = store();
    assert!(store.begin("s-1", "first", "d", announce()));
    store.update(|session, _| session.run_state = RunState::Completed);

    assert!(store.begin("s-2", "second", "d", announce()));
    assert_eq!(store.snapshot().id, "s-2");
}

#[test]
fn cancelled_updates_are_skipped() {
    let (store, _) = store();
    let cancel = CancellationToken::new();

    assert!(store.update_unless_cancelled(&cancel, |session, _| {
        session.workflow_status.set(Agent::Orchestrator, AgentStatus::Active);
    }));

    cancel.cancel();
    let applied = store.update_unless_cancelled(&cancel, |session, now| {
        session.workflow_status.set(Agent::Orchestrator, AgentStatus::Completed);
        session.push_log(now, LogEntry::new(LogLevel::Success, "late"));
    });

    assert!(!applied);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.workflow_status.orchestrator, AgentStatus::Active);
    assert!(snapshot.logs.is_empty());
}

#[test]
fn log_uses_clock_time() {
    let (store, clock) = store();
    store.log(LogEntry::new(LogLevel::Info, "a"));
    clock.advance(Duration::from_millis(250));
    store.log(LogEntry::new(LogLevel::Info, "b"));

    let stamps: Vec<i64> = store.snapshot().logs.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 1_250]);
}

#[tokio::test]
async fn subscribers_see_updates() {
    let (store, _) = store();
    let mut rx = store.subscribe();

    store.log(LogEntry::new(LogLevel::Info, "hello"));

    rx.changed().await.expect("sender alive");
    assert_eq!(rx.borrow().logs.len(), 1);
}

#[tokio::test]
async fn skipped_updates_do_not_notify() {
    let (store, _) = store();
    let mut rx = store.subscribe();
    let cancel = CancellationToken::new();
    cancel.cancel();

    store.update_unless_cancelled(&cancel, |session, _| session.current_step = "x".into());

    assert!(!rx.has_changed().expect("sender alive"));
}

fn entry(timestamp: i64, message: &str) -> LogEntry {
    LogEntry {
        timestamp,
        ..LogEntry::system(LogLevel::Info, message)
    }
}

#[test]
fn log_cursor_returns_only_appended_entries() {
    let mut cursor = LogCursor::default();
    let mut logs = vec![entry(1, "Starting analysis")];
    assert_eq!(cursor.fresh(&logs).len(), 1);

    logs.push(entry(2, "Backend workflow wf-1 started"));
    logs.push(entry(3, "Orchestrator: classification started"));

    let fresh = cursor.fresh(&logs);
    assert_eq!(fresh, &logs[1..]);
    assert!(cursor.fresh(&logs).is_empty());
}

#[test]
fn log_cursor_restarts_when_a_snapshot_replaces_the_log() {
    let mut cursor = LogCursor::default();
    let local = vec![entry(1, "Starting analysis"), entry(2, "Backend workflow wf-1 started")];
    cursor.fresh(&local);

    let remote = vec![
        entry(10, "Starting workflow"),
        entry(11, "Classifying request"),
        entry(12, "Request classified"),
    ];

    assert_eq!(cursor.fresh(&remote), &remote[..]);
}

#[test]
fn log_cursor_restarts_after_clear() {
    let mut cursor = LogCursor::default();
    let before = vec![entry(1, "a"), entry(2, "b"), entry(3, "c")];
    cursor.fresh(&before);

    let cleared = vec![entry(4, "Logs cleared")];

    assert_eq!(cursor.fresh(&cleared), &cleared[..]);
}
