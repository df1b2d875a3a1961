//! Session orchestration modules.
//!
//! Covers the session controller, the remote polling driver and the local
//! simulation fallback.

pub mod remote_sync;
pub mod session_controller;
pub mod simulation;

use serde::{Deserialize, Serialize};

/// Terminal state reached by a strategy that ran to the end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    /// The pipeline completed.
    Completed,
    /// The pipeline reported failure.
    Failed,
}
