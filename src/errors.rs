//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The backend could not create a workflow (connection refused,
    /// non-success response or start timeout).
    RemoteUnavailable(String),
    /// A status or log fetch failed while a remote workflow was being polled.
    Poll(String),
    /// The poll ceiling was reached without a terminal status.
    PollTimeout(String),
    /// The run was cancelled by an explicit stop.
    Cancelled,
    /// The report artifact could not be downloaded; carries the server body.
    ReportDownload(String),
    /// A run is already in progress.
    AlreadyRunning,
    /// Background task failed to join.
    Runtime(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::RemoteUnavailable(msg) => write!(f, "remote unavailable: {msg}"),
            Self::Poll(msg) => write!(f, "poll: {msg}"),
            Self::PollTimeout(msg) => write!(f, "poll timeout: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ReportDownload(msg) => write!(f, "report download: {msg}"),
            Self::AlreadyRunning => write!(f, "already running"),
            Self::Runtime(msg) => write!(f, "runtime: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
