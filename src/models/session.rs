//! Workflow session model and lifecycle helpers.

use serde::{Deserialize, Serialize};

use super::agent::{AgentStatus, WorkflowStatusMap};
use super::log::LogEntry;

/// Lifecycle status of a workflow session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing running; initial state and the state after a stop.
    #[default]
    Idle,
    /// A strategy is driving the session.
    Running,
    /// The pipeline finished successfully.
    Completed,
    /// The pipeline failed, timed out or could not be reached.
    Failed,
}

/// How a session is driven. Chosen once per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Strategy {
    /// Polling a workflow created on the remote backend.
    Remote {
        /// Identifier returned by the backend.
        workflow_id: String,
    },
    /// Replaying the local scripted pipeline.
    Simulation,
}

/// The session state observed by consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowSession {
    /// Locally generated session identifier; empty before the first start.
    pub id: String,
    /// The query that started the session.
    pub query: String,
    /// Identifier of the demo case the query belongs to.
    pub demo_id: String,
    /// Current lifecycle status.
    pub run_state: RunState,
    /// Per-agent status.
    pub workflow_status: WorkflowStatusMap,
    /// Short description of the current pipeline step.
    pub current_step: String,
    /// Final textual result reported by the backend.
    pub final_result: Option<String>,
    /// Ordered session log.
    pub logs: Vec<LogEntry>,
    /// Strategy driving the session, once decided.
    pub strategy: Option<Strategy>,
}

impl WorkflowSession {
    /// Whether a strategy is still driving the session.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Remote workflow identifier, when the session is driven remotely.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        match &self.strategy {
            Some(Strategy::Remote { workflow_id }) => Some(workflow_id),
            _ => None,
        }
    }

    /// Reset to a fresh running session.
    pub fn begin(&mut self, id: String, query: String, demo_id: String) {
        self.id = id;
        self.query = query;
        self.demo_id = demo_id;
        self.run_state = RunState::Running;
        self.workflow_status = WorkflowStatusMap::all(AgentStatus::Idle);
        self.current_step.clear();
        self.final_result = None;
        self.strategy = None;
    }

    /// Stop driving the session and return every agent to idle.
    pub fn halt(&mut self) {
        self.run_state = RunState::Idle;
        self.workflow_status = WorkflowStatusMap::all(AgentStatus::Idle);
        self.current_step.clear();
    }

    /// Append an entry, stamping it with `now` clamped so timestamps never
    /// go backwards.
    pub fn push_log(&mut self, now: i64, mut entry: LogEntry) {
        let floor = self.logs.last().map_or(i64::MIN, |last| last.timestamp);
        entry.timestamp = now.max(floor);
        self.logs.push(entry);
    }

    /// Replace the whole log with an authoritative snapshot.
    pub fn replace_logs(&mut self, logs: Vec<LogEntry>) {
        self.logs = logs;
    }
}
