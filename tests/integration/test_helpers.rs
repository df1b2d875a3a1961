//! Shared test helpers for controller-level integration tests.
//!
//! Provides a scripted in-memory [`WorkflowBackend`] and reusable
//! construction of a controller wired to a virtual clock, so individual
//! test modules can focus on behaviour rather than boilerplate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

use workflow_sync::backend::{
    BackendFuture, LogSnapshot, RemoteStatus, StartRequest, StatusSnapshot, WorkflowBackend,
};
use workflow_sync::clock::ManualClock;
use workflow_sync::models::{AgentStatus, LogEntry, LogLevel, WorkflowStatusMap};
use workflow_sync::orchestrator::remote_sync::PollSettings;
use workflow_sync::orchestrator::session_controller::{ControllerSettings, SessionController};
use workflow_sync::store::StateStore;
use workflow_sync::AppError;

/// Virtual epoch every test clock starts at.
pub const T0: i64 = 1_700_000_000_000;

/// How the scripted backend answers `POST /api/workflow/start`.
#[derive(Debug, Clone)]
pub enum StartBehaviour {
    /// Accept with the given workflow id.
    Accept(String),
    /// Fail as if the backend could not be reached.
    Refuse(String),
    /// Never answer.
    Hang,
}

/// In-memory backend replaying queued responses.
///
/// The last queued status and log snapshot repeat once the queues drain.
pub struct ScriptedBackend {
    start: StartBehaviour,
    statuses: Mutex<VecDeque<Result<StatusSnapshot, String>>>,
    logs: Mutex<VecDeque<Vec<LogEntry>>>,
    report: Mutex<Result<Bytes, String>>,
    /// Number of status fetches issued.
    pub status_calls: AtomicUsize,
    /// Number of log fetches issued.
    pub log_calls: AtomicUsize,
    /// Number of start requests issued.
    pub start_calls: AtomicUsize,
    hold_polls: AtomicBool,
    panic_on_poll: AtomicBool,
    /// Notified each time a held status fetch is waiting.
    pub poll_entered: Notify,
    /// Releases held status fetches.
    pub poll_release: Notify,
}

impl ScriptedBackend {
    pub fn accepting(workflow_id: &str) -> Self {
        Self::new(StartBehaviour::Accept(workflow_id.to_owned()))
    }

    pub fn unreachable() -> Self {
        Self::new(StartBehaviour::Refuse("connection refused".into()))
    }

    pub fn hanging() -> Self {
        Self::new(StartBehaviour::Hang)
    }

    fn new(start: StartBehaviour) -> Self {
        Self {
            start,
            statuses: Mutex::new(VecDeque::new()),
            logs: Mutex::new(VecDeque::new()),
            report: Mutex::new(Err("Workflow not finished".into())),
            status_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            hold_polls: AtomicBool::new(false),
            panic_on_poll: AtomicBool::new(false),
            poll_entered: Notify::new(),
            poll_release: Notify::new(),
        }
    }

    pub fn push_status(self, status: StatusSnapshot) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn push_status_error(self, reason: &str) -> Self {
        self.statuses.lock().unwrap().push_back(Err(reason.to_owned()));
        self
    }

    pub fn push_logs(self, logs: Vec<LogEntry>) -> Self {
        self.logs.lock().unwrap().push_back(logs);
        self
    }

    pub fn with_report(self, report: Result<Bytes, String>) -> Self {
        *self.report.lock().unwrap() = report;
        self
    }

    /// Make status fetches block until [`poll_release`](Self::poll_release)
    /// is notified.
    pub fn hold_polls(self) -> Self {
        self.hold_polls.store(true, Ordering::SeqCst);
        self
    }

    /// Make status fetches panic, as a buggy backend would.
    pub fn panic_on_poll(self) -> Self {
        self.panic_on_poll.store(true, Ordering::SeqCst);
        self
    }

    fn next_status(&self) -> Result<StatusSnapshot, String> {
        let mut queue = self.statuses.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(running(WorkflowStatusMap::default(), "")))
        }
    }

    fn next_logs(&self) -> Vec<LogEntry> {
        let mut queue = self.logs.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }
}

impl WorkflowBackend for ScriptedBackend {
    fn start_workflow<'a>(&'a self, _request: &'a StartRequest) -> BackendFuture<'a, String> {
        Box::pin(async move {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            match &self.start {
                StartBehaviour::Accept(id) => Ok(id.clone()),
                StartBehaviour::Refuse(reason) => Err(AppError::RemoteUnavailable(reason.clone())),
                StartBehaviour::Hang => std::future::pending().await,
            }
        })
    }

    fn status<'a>(&'a self, _workflow_id: &'a str) -> BackendFuture<'a, StatusSnapshot> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            assert!(
                !self.panic_on_poll.load(Ordering::SeqCst),
                "scripted backend exploded"
            );
            if self.hold_polls.load(Ordering::SeqCst) {
                self.poll_entered.notify_one();
                self.poll_release.notified().await;
            }
            self.next_status().map_err(AppError::Poll)
        })
    }

    fn logs<'a>(&'a self, _workflow_id: &'a str) -> BackendFuture<'a, LogSnapshot> {
        Box::pin(async move {
            self.log_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LogSnapshot {
                logs: self.next_logs(),
            })
        })
    }

    fn download_report<'a>(&'a self, _workflow_id: &'a str) -> BackendFuture<'a, Bytes> {
        Box::pin(async move {
            self.report
                .lock()
                .unwrap()
                .clone()
                .map_err(AppError::ReportDownload)
        })
    }
}

/// A `running` status snapshot.
pub fn running(map: WorkflowStatusMap, step: &str) -> StatusSnapshot {
    StatusSnapshot {
        status: RemoteStatus::Running,
        workflow_status: Some(map),
        current_step: Some(step.to_owned()),
        final_result: None,
    }
}

/// A terminal status snapshot with every agent in `agent_status`.
pub fn terminal(status: RemoteStatus, agent_status: AgentStatus) -> StatusSnapshot {
    StatusSnapshot {
        status,
        workflow_status: Some(WorkflowStatusMap::all(agent_status)),
        current_step: Some("Workflow finished".into()),
        final_result: Some("Revenue grew 12%".into()),
    }
}

/// A backend-side log entry.
pub fn remote_log(timestamp: i64, message: &str) -> LogEntry {
    LogEntry {
        timestamp,
        level: LogLevel::Info,
        message: message.to_owned(),
        agent: Some("Orchestrator".into()),
        details: None,
    }
}

/// Settings with a short poll ceiling.
pub fn fast_settings(max_polls: u32) -> ControllerSettings {
    ControllerSettings {
        poll: PollSettings {
            interval: Duration::from_secs(1),
            max_polls,
            request_timeout: None,
        },
        start_timeout: Duration::from_secs(5),
        simulation_enabled: true,
        speed_factor: 1.0,
    }
}

/// Controller with default test settings for a backend that refuses to
/// start workflows.
pub fn fallback_controller() -> (SessionController, Arc<StateStore>, Arc<ManualClock>) {
    controller_with(Arc::new(ScriptedBackend::unreachable()), fast_settings(60))
}

/// Controller wired to `backend`, a fresh store and a virtual clock.
pub fn controller_with(
    backend: Arc<ScriptedBackend>,
    settings: ControllerSettings,
) -> (SessionController, Arc<StateStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(StateStore::new(clock.clone()));
    let controller = SessionController::new(backend, Arc::clone(&store), clock.clone(), settings);
    (controller, store, clock)
}

/// Messages of every log entry, in order.
pub fn messages(store: &StateStore) -> Vec<String> {
    store
        .snapshot()
        .logs
        .iter()
        .map(|entry| entry.message.clone())
        .collect()
}
