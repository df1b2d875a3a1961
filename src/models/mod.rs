//! Domain model module declarations.

pub mod agent;
pub mod log;
pub mod session;

pub use agent::{Agent, AgentStatus, WorkflowStatusMap};
pub use log::{LogEntry, LogLevel};
pub use session::{RunState, Strategy, WorkflowSession};
