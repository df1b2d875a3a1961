#![forbid(unsafe_code)]

//! Client-side progress synchronization for remote multi-agent workflows.
//!
//! A [`SessionController`](orchestrator::session_controller::SessionController)
//! starts a workflow on the backend and tracks it by polling, or replays a
//! deterministic local simulation when the backend cannot be reached. Both
//! paths write into an observable [`StateStore`](store::StateStore).

pub mod backend;
pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
