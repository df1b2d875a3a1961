//! Contract with the remote multi-agent backend.
//!
//! The [`WorkflowBackend`] trait is the seam between the synchronization
//! engine and the HTTP service. [`http::HttpBackend`] talks to the real
//! service; tests substitute scripted implementations.
//!
//! Endpoints:
//! - `POST /api/workflow/start`
//! - `GET /api/workflow/{id}/status`
//! - `GET /api/workflow/{id}/logs`
//! - `GET /api/workflow/{id}/report/download`

pub mod http;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::models::{LogEntry, WorkflowStatusMap};
use crate::Result;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Body of `POST /api/workflow/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Natural-language analysis query.
    pub query: String,
    /// Demo case identifier.
    pub demo_id: String,
}

/// Response of `POST /api/workflow/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// Whether the backend accepted the workflow.
    pub success: bool,
    /// Identifier of the created workflow.
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Optional human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Remote workflow lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// Still executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure. The backend reports crashed runs as `error`.
    #[serde(alias = "error")]
    Failed,
}

impl RemoteStatus {
    /// Whether polling should stop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Response of `GET /api/workflow/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    /// Lifecycle status.
    pub status: RemoteStatus,
    /// Per-agent status, when reported.
    #[serde(default)]
    pub workflow_status: Option<WorkflowStatusMap>,
    /// Current pipeline step, when reported.
    #[serde(default)]
    pub current_step: Option<String>,
    /// Final textual result, once available.
    #[serde(default)]
    pub final_result: Option<String>,
}

/// Response of `GET /api/workflow/{id}/logs`: the full log, not a delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogSnapshot {
    /// Every log entry recorded so far, in backend order.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Operations the engine needs from the remote backend.
pub trait WorkflowBackend: Send + Sync {
    /// Create a remote workflow and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RemoteUnavailable`](crate::AppError::RemoteUnavailable)
    /// on connection failure, timeout, non-2xx status or `success: false`.
    fn start_workflow<'a>(&'a self, request: &'a StartRequest) -> BackendFuture<'a, String>;

    /// Fetch the current status snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Poll`](crate::AppError::Poll) on any failure.
    fn status<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, StatusSnapshot>;

    /// Fetch the full log snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Poll`](crate::AppError::Poll) on any failure.
    fn logs<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, LogSnapshot>;

    /// Download the generated report artifact.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ReportDownload`](crate::AppError::ReportDownload)
    /// carrying the server-provided body when the response is not `200`.
    fn download_report<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, Bytes>;
}
