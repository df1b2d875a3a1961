//! Session lifecycle: start, stop, clear logs.
//!
//! [`SessionController`] is the single entry point for consumers. Each
//! start makes exactly one strategy decision: a workflow the backend
//! accepted is polled through [`RemoteSync`]; otherwise the run falls back
//! to the [`SimulationEngine`]. The decision is recorded in the session and
//! never revisited. A per-session [`CancellationToken`] is threaded into the
//! chosen strategy and fired by [`stop`](SessionController::stop).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::remote_sync::{PollSettings, RemoteSync};
use super::simulation::SimulationEngine;
use super::Terminal;
use crate::backend::{StartRequest, WorkflowBackend};
use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::models::{LogEntry, LogLevel, RunState, Strategy};
use crate::store::StateStore;
use crate::{AppError, Result};

/// Knobs the controller passes on to the strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    /// Remote polling cadence.
    pub poll: PollSettings,
    /// Limit on the workflow start request before falling back.
    pub start_timeout: Duration,
    /// Fall back to the simulation when the backend is unreachable.
    pub simulation_enabled: bool,
    /// Multiplier for scripted simulation delays.
    pub speed_factor: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            start_timeout: Duration::from_secs(5),
            simulation_enabled: true,
            speed_factor: 1.0,
        }
    }
}

impl ControllerSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            poll: PollSettings {
                interval: config.poll_interval(),
                max_polls: config.backend.max_polls,
                request_timeout: Some(config.request_timeout()),
            },
            start_timeout: config.start_timeout(),
            simulation_enabled: config.simulation.enabled,
            speed_factor: config.simulation.speed_factor,
        }
    }
}

/// Result of [`SessionController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was already running; nothing changed.
    AlreadyRunning,
    /// A strategy now drives the new session in the background.
    Started {
        /// Locally generated session identifier.
        session_id: String,
        /// The strategy chosen for the session.
        strategy: Strategy,
    },
    /// The session was stopped before a strategy was chosen.
    Aborted {
        /// Identifier of the abandoned session.
        session_id: String,
    },
    /// The backend was unreachable and the simulation fallback is disabled.
    Unavailable {
        /// Identifier of the failed session.
        session_id: String,
        /// Why the backend could not be used.
        reason: String,
    },
}

struct ActiveRun {
    session_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<Terminal>>>,
}

/// Owns the session lifecycle and strategy selection.
pub struct SessionController {
    store: Arc<StateStore>,
    backend: Arc<dyn WorkflowBackend>,
    clock: Arc<dyn Clock>,
    simulation: Arc<SimulationEngine>,
    settings: ControllerSettings,
    active: Mutex<Option<ActiveRun>>,
}

impl SessionController {
    /// Build a controller writing into `store`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
    ) -> Self {
        let simulation = Arc::new(SimulationEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.speed_factor,
        ));
        Self {
            store,
            backend,
            clock,
            simulation,
            settings,
            active: Mutex::new(None),
        }
    }

    /// The store this controller writes into.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Start a new session for `query`.
    ///
    /// No-op when a session is already running. Otherwise the session is
    /// reset, a remote workflow is requested and the resulting strategy is
    /// spawned in the background.
    pub async fn start(&self, query: &str, demo_id: &str) -> StartOutcome {
        let session_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock().await;
            let announce = LogEntry::system(LogLevel::Info, format!("Starting analysis: {query}"));
            if !self.store.begin(&session_id, query, demo_id, announce) {
                debug!("start ignored: a session is already running");
                return StartOutcome::AlreadyRunning;
            }

            // The previous run is no longer running; make sure its task has
            // exited before a new strategy can write.
            if let Some(previous) = active.take() {
                previous.cancel.cancel();
                if let Some(task) = previous.task {
                    if let Err(err) = task.await {
                        warn!(session_id = %previous.session_id, %err, "previous run task failed");
                    }
                }
            }

            *active = Some(ActiveRun {
                session_id: session_id.clone(),
                cancel: cancel.clone(),
                task: None,
            });
        }

        info!(session_id, demo_id, "session started");

        let request = StartRequest {
            query: query.to_owned(),
            demo_id: demo_id.to_owned(),
        };
        let limit = self.settings.start_timeout;
        let created = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(session_id, "session stopped during workflow creation");
                return StartOutcome::Aborted { session_id };
            }
            created = self.backend.start_workflow(&request) => created,
            () = self.clock.sleep(limit) => Err(AppError::RemoteUnavailable(format!(
                "start request timed out after {} ms",
                limit.as_millis()
            ))),
        };

        let mut active = self.active.lock().await;
        let Some(run) = active
            .as_mut()
            .filter(|run| run.session_id == session_id && !run.cancel.is_cancelled())
        else {
            return StartOutcome::Aborted { session_id };
        };

        let (strategy, entry) = match created {
            Ok(workflow_id) => {
                info!(session_id, workflow_id, "remote workflow accepted");
                let entry = LogEntry::system(
                    LogLevel::Success,
                    format!("Backend workflow {workflow_id} started"),
                );
                (Strategy::Remote { workflow_id }, entry)
            }
            Err(err) if self.settings.simulation_enabled => {
                warn!(session_id, %err, "backend unavailable, falling back to simulation");
                let entry = LogEntry::system(
                    LogLevel::Warning,
                    format!("Backend unreachable ({err}), running local simulation"),
                );
                (Strategy::Simulation, entry)
            }
            Err(err) => {
                error!(session_id, %err, "backend unavailable and simulation disabled");
                let reason = err.to_string();
                self.store.update_unless_cancelled(&run.cancel, |session, now| {
                    session.run_state = RunState::Failed;
                    session.push_log(
                        now,
                        LogEntry::system(
                            LogLevel::Error,
                            format!("Backend unreachable ({reason}), cannot run analysis"),
                        ),
                    );
                });
                return StartOutcome::Unavailable { session_id, reason };
            }
        };

        let recorded = self.store.update_unless_cancelled(&run.cancel, |session, now| {
            session.strategy = Some(strategy.clone());
            session.push_log(now, entry);
        });
        if !recorded {
            return StartOutcome::Aborted { session_id };
        }

        run.task = Some(self.spawn_run(&session_id, strategy.clone(), run.cancel.clone()));
        StartOutcome::Started {
            session_id,
            strategy,
        }
    }

    /// Stop the running session, if any.
    ///
    /// Cancels the active strategy, returns every agent to idle and appends
    /// one warning entry. Safe to call when nothing is running.
    pub async fn stop(&self) {
        let active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            run.cancel.cancel();
            info!(session_id = %run.session_id, "session stop requested");
        }
        self.store.update(|session, now| {
            session.halt();
            session.push_log(now, LogEntry::system(LogLevel::Warning, "Workflow stopped"));
        });
    }

    /// Empty the log, leaving a single entry recording the action.
    pub fn clear_logs(&self) {
        self.store.update(|session, now| {
            session.logs.clear();
            session.push_log(now, LogEntry::system(LogLevel::Info, "Logs cleared"));
        });
    }

    /// Await the background task of the current session.
    ///
    /// Returns `None` when no task is pending (nothing started, already
    /// awaited, or the session never got past workflow creation).
    pub async fn wait(&self) -> Option<Result<Terminal>> {
        let task = self.active.lock().await.as_mut().and_then(|run| run.task.take())?;
        Some(
            task.await
                .map_err(|err| AppError::Runtime(format!("run task failed: {err}")))
                .and_then(|outcome| outcome),
        )
    }

    /// Download the report of the current remote workflow.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReportDownload` when the session is not driven by
    /// a remote workflow or the backend refuses the download. Session state
    /// is never modified.
    pub async fn download_report(&self) -> Result<Bytes> {
        let workflow_id = self
            .store
            .snapshot()
            .workflow_id()
            .map(str::to_owned)
            .ok_or_else(|| AppError::ReportDownload("no remote workflow available".into()))?;
        self.backend.download_report(&workflow_id).await
    }

    fn spawn_run(
        &self,
        session_id: &str,
        strategy: Strategy,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<Terminal>> {
        let span = info_span!("workflow_run", session_id);
        let store = Arc::clone(&self.store);

        let run = match strategy {
            Strategy::Remote { workflow_id } => {
                let sync = RemoteSync::new(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.store),
                    Arc::clone(&self.clock),
                    self.settings.poll,
                );
                let cancel = cancel.clone();
                tokio::spawn(
                    async move { sync.run(&workflow_id, &cancel).await }.instrument(span.clone()),
                )
            }
            Strategy::Simulation => {
                let engine = Arc::clone(&self.simulation);
                let store = Arc::clone(&self.store);
                let session_id = session_id.to_owned();
                let cancel = cancel.clone();
                tokio::spawn(
                    async move {
                        let outcome = engine.run(&session_id, &cancel).await;
                        if matches!(outcome, Err(AppError::AlreadyRunning)) {
                            store.update_unless_cancelled(&cancel, |session, now| {
                                session.run_state = RunState::Failed;
                                session.push_log(
                                    now,
                                    LogEntry::system(
                                        LogLevel::Error,
                                        "Simulation already in progress",
                                    ),
                                );
                            });
                        }
                        outcome
                    }
                    .instrument(span.clone()),
                )
            }
        };

        // Supervise the strategy task so a panic still ends the session.
        tokio::spawn(
            async move {
                let outcome = match run.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(%err, "run task failed");
                        let reason = format!("run task failed: {err}");
                        store.update_unless_cancelled(&cancel, |session, now| {
                            session.run_state = RunState::Failed;
                            session.push_log(
                                now,
                                LogEntry::system(
                                    LogLevel::Error,
                                    format!("Workflow aborted: {reason}"),
                                ),
                            );
                        });
                        Err(AppError::Runtime(reason))
                    }
                };
                report_outcome(&outcome);
                outcome
            }
            .instrument(span),
        )
    }
}

fn report_outcome(outcome: &Result<Terminal>) {
    match outcome {
        Ok(terminal) => info!(?terminal, "run finished"),
        Err(AppError::Cancelled) => debug!("run cancelled"),
        Err(err) => warn!(%err, "run ended without completion"),
    }
}
