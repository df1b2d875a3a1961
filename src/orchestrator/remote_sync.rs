//! Polling driver for a workflow running on the remote backend.
//!
//! Each iteration fetches the status and log snapshots concurrently and
//! replaces the local session with them. The backend owns ordering, so the
//! log snapshot is authoritative rather than a delta. Failures are never
//! retried: they end the run with one descriptive log entry.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Terminal;
use crate::backend::{LogSnapshot, RemoteStatus, StatusSnapshot, WorkflowBackend};
use crate::clock::Clock;
use crate::models::{LogEntry, LogLevel, RunState};
use crate::store::StateStore;
use crate::{AppError, Result};

/// Poll cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between iterations.
    pub interval: Duration,
    /// Iterations allowed before the run is abandoned.
    pub max_polls: u32,
    /// Limit on one concurrent status+logs fetch. `None` leaves it to the
    /// backend.
    pub request_timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 60,
            request_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Drives an already-created remote workflow to a terminal state.
pub struct RemoteSync {
    backend: Arc<dyn WorkflowBackend>,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
}

impl RemoteSync {
    /// Construct a driver; nothing runs until [`run`](Self::run).
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Self {
            backend,
            store,
            clock,
            settings,
        }
    }

    /// Poll `workflow_id` until it reaches a terminal status, the ceiling is
    /// hit, a request fails or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled` when `cancel` fired; the store is untouched.
    /// - `AppError::Poll` when a fetch failed; an error entry was logged.
    /// - `AppError::PollTimeout` when the ceiling was reached; a warning
    ///   entry was logged.
    pub async fn run(&self, workflow_id: &str, cancel: &CancellationToken) -> Result<Terminal> {
        let mut polls: u32 = 0;

        while polls < self.settings.max_polls {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(workflow_id, polls, "poll abandoned on cancellation");
                    return Err(AppError::Cancelled);
                }
                fetched = self.fetch(workflow_id) => fetched,
            };

            let (status, logs) = match fetched {
                Ok(pair) => pair,
                Err(err) => return Err(self.fail_on_poll_error(err, cancel)),
            };

            let remote = status.status;
            if !self.apply(status, logs, cancel) {
                return Err(AppError::Cancelled);
            }

            if remote.is_terminal() {
                return self.finish(workflow_id, remote, cancel);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AppError::Cancelled),
                () = self.clock.sleep(self.settings.interval) => {}
            }
            polls += 1;
        }

        warn!(workflow_id, polls, "workflow polling timeout");
        let applied = self.store.update_unless_cancelled(cancel, |session, now| {
            session.run_state = RunState::Failed;
            session.push_log(
                now,
                LogEntry::system(LogLevel::Warning, "Workflow polling timeout reached"),
            );
        });
        if !applied {
            return Err(AppError::Cancelled);
        }
        Err(AppError::PollTimeout(format!(
            "no terminal status after {polls} polls"
        )))
    }

    async fn fetch(&self, workflow_id: &str) -> Result<(StatusSnapshot, LogSnapshot)> {
        let both = async {
            let (status, logs) = tokio::join!(
                self.backend.status(workflow_id),
                self.backend.logs(workflow_id)
            );
            Ok::<_, AppError>((status?, logs?))
        };

        let Some(limit) = self.settings.request_timeout else {
            return both.await;
        };
        tokio::select! {
            biased;
            fetched = both => fetched,
            () = self.clock.sleep(limit) => Err(AppError::Poll(format!(
                "no response within {} ms",
                limit.as_millis()
            ))),
        }
    }

    /// Replace local state with the snapshots. Returns `false` if the run was
    /// cancelled meanwhile.
    fn apply(&self, status: StatusSnapshot, logs: LogSnapshot, cancel: &CancellationToken) -> bool {
        self.store.update_unless_cancelled(cancel, |session, _now| {
            if let Some(map) = status.workflow_status {
                session.workflow_status = map;
            }
            if let Some(step) = status.current_step.filter(|step| !step.is_empty()) {
                session.current_step = step;
            }
            if let Some(result) = status.final_result.filter(|result| !result.is_empty()) {
                session.final_result = Some(result);
            }
            if !logs.logs.is_empty() {
                session.replace_logs(logs.logs);
            }
        })
    }

    fn finish(
        &self,
        workflow_id: &str,
        remote: RemoteStatus,
        cancel: &CancellationToken,
    ) -> Result<Terminal> {
        let (terminal, run_state, entry) = match remote {
            RemoteStatus::Completed => (
                Terminal::Completed,
                RunState::Completed,
                LogEntry::system(LogLevel::Success, "Workflow completed successfully"),
            ),
            RemoteStatus::Failed | RemoteStatus::Running => (
                Terminal::Failed,
                RunState::Failed,
                LogEntry::system(LogLevel::Error, "Workflow failed"),
            ),
        };

        let applied = self.store.update_unless_cancelled(cancel, |session, now| {
            session.run_state = run_state;
            session.push_log(now, entry);
        });
        if !applied {
            return Err(AppError::Cancelled);
        }

        info!(workflow_id, ?terminal, "remote workflow finished");
        Ok(terminal)
    }

    fn fail_on_poll_error(&self, err: AppError, cancel: &CancellationToken) -> AppError {
        warn!(%err, "workflow poll failed");
        let message = match &err {
            AppError::Poll(reason) => format!("Failed to fetch workflow data: {reason}"),
            other => format!("Failed to fetch workflow data: {other}"),
        };
        let applied = self.store.update_unless_cancelled(cancel, |session, now| {
            session.run_state = RunState::Failed;
            session.push_log(now, LogEntry::system(LogLevel::Error, message));
        });
        if applied {
            err
        } else {
            AppError::Cancelled
        }
    }
}
