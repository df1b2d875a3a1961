//! Observable session state container.
//!
//! [`StateStore`] wraps a `tokio::sync::watch` channel: writers mutate the
//! current [`WorkflowSession`] in place and every subscriber is notified of
//! the change. The store holds no logic of its own beyond stamping log
//! timestamps; it never performs I/O or starts timers.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::models::{LogEntry, WorkflowSession};

/// Shared, observable holder of the current session.
pub struct StateStore {
    tx: watch::Sender<WorkflowSession>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Create an empty store stamping log entries with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = watch::channel(WorkflowSession::default());
        Self { tx, clock }
    }

    /// Clone of the current session.
    #[must_use]
    pub fn snapshot(&self) -> WorkflowSession {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSession> {
        self.tx.subscribe()
    }

    /// Whether a session is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tx.borrow().is_running()
    }

    /// Atomically start a new session unless one is already running.
    ///
    /// Returns `false` without touching state when a session is running.
    pub fn begin(&self, id: &str, query: &str, demo_id: &str, announce: LogEntry) -> bool {
        let now = self.clock.now_millis();
        self.tx.send_if_modified(|session| {
            if session.is_running() {
                return false;
            }
            session.begin(id.to_owned(), query.to_owned(), demo_id.to_owned());
            session.push_log(now, announce);
            true
        })
    }

    /// Apply `f` to the session. `f` receives the current time in
    /// milliseconds for stamping log entries.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut WorkflowSession, i64),
    {
        let now = self.clock.now_millis();
        self.tx.send_modify(|session| f(session, now));
    }

    /// Apply `f` only while `cancel` has not fired.
    ///
    /// The token is checked while the write lock is held, so a mutation is
    /// either fully ordered before a concurrent stop or skipped. Returns
    /// whether `f` ran.
    pub fn update_unless_cancelled<F>(&self, cancel: &CancellationToken, f: F) -> bool
    where
        F: FnOnce(&mut WorkflowSession, i64),
    {
        let now = self.clock.now_millis();
        self.tx.send_if_modified(|session| {
            if cancel.is_cancelled() {
                return false;
            }
            f(session, now);
            true
        })
    }

    /// Append a single log entry.
    pub fn log(&self, entry: LogEntry) {
        self.update(|session, now| session.push_log(now, entry));
    }
}

/// Tracks which log entries a consumer has already seen.
///
/// The log is append-only within a session, but a remote snapshot or a
/// clear replaces it wholesale. When the entry last seen no longer sits at
/// its old position the whole log counts as fresh again.
#[derive(Debug, Default)]
pub struct LogCursor {
    seen: usize,
    last: Option<LogEntry>,
}

impl LogCursor {
    /// Entries of `logs` not yet returned by this cursor.
    pub fn fresh<'a>(&mut self, logs: &'a [LogEntry]) -> &'a [LogEntry] {
        let unchanged = match self.seen.checked_sub(1) {
            Some(index) => logs.get(index) == self.last.as_ref(),
            None => true,
        };
        if !unchanged {
            self.seen = 0;
        }
        let fresh = &logs[self.seen..];
        self.seen = logs.len();
        self.last = logs.last().cloned();
        fresh
    }
}
