//! Session log entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent label used for entries produced by the client itself.
pub const SYSTEM_AGENT: &str = "System";

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Progress information.
    Info,
    /// A stage or the whole run finished successfully.
    Success,
    /// Non-fatal problem (fallback, stop, timeout).
    Warning,
    /// Fatal problem for the current run.
    Error,
}

/// A single entry of the append-only session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Label of the emitting agent, if any.
    #[serde(default)]
    pub agent: Option<String>,
    /// Structured payload attached to the entry.
    #[serde(default)]
    pub details: Option<Value>,
}

impl LogEntry {
    /// Build an entry without agent or details; the timestamp is assigned
    /// when the entry is appended to a session.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            level,
            message: message.into(),
            agent: None,
            details: None,
        }
    }

    /// Shorthand for a [`SYSTEM_AGENT`] entry.
    pub fn system(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, message).with_agent(SYSTEM_AGENT)
    }

    /// Attach the emitting agent label.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
