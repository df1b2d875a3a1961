//! Pipeline agents and their per-agent status map.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single pipeline agent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not yet started.
    #[default]
    Idle,
    /// Currently working.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

/// The closed set of pipeline stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Agent {
    /// Classifies the incoming request and routes it.
    Orchestrator,
    /// Computes KPIs from the query results.
    DataAnalyst,
    /// Executes SQL against the analytical store.
    DuckdbTool,
    /// Drafts the final report.
    ReportGenerator,
}

impl Agent {
    /// Every agent, in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::Orchestrator,
        Self::DataAnalyst,
        Self::DuckdbTool,
        Self::ReportGenerator,
    ];

    /// Human-readable label used as the `agent` field of log entries.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Orchestrator => "Orchestrator",
            Self::DataAnalyst => "DataAnalyst",
            Self::DuckdbTool => "DuckDBTool",
            Self::ReportGenerator => "ReportGenerator",
        }
    }
}

/// Status of every pipeline agent.
///
/// A struct rather than a map so all four keys are always present; a wire
/// payload missing any key fails to deserialize instead of yielding a
/// partial view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusMap {
    /// Orchestrator status.
    pub orchestrator: AgentStatus,
    /// Data analyst status.
    pub data_analyst: AgentStatus,
    /// `DuckDB` tool status.
    pub duckdb_tool: AgentStatus,
    /// Report generator status.
    pub report_generator: AgentStatus,
}

impl WorkflowStatusMap {
    /// Map with every agent set to `status`.
    #[must_use]
    pub fn all(status: AgentStatus) -> Self {
        Self {
            orchestrator: status,
            data_analyst: status,
            duckdb_tool: status,
            report_generator: status,
        }
    }

    /// Status of one agent.
    #[must_use]
    pub fn get(&self, agent: Agent) -> AgentStatus {
        match agent {
            Agent::Orchestrator => self.orchestrator,
            Agent::DataAnalyst => self.data_analyst,
            Agent::DuckdbTool => self.duckdb_tool,
            Agent::ReportGenerator => self.report_generator,
        }
    }

    /// Set the status of one agent.
    pub fn set(&mut self, agent: Agent, status: AgentStatus) {
        let slot = match agent {
            Agent::Orchestrator => &mut self.orchestrator,
            Agent::DataAnalyst => &mut self.data_analyst,
            Agent::DuckdbTool => &mut self.duckdb_tool,
            Agent::ReportGenerator => &mut self.report_generator,
        };
        *slot = status;
    }

    /// Whether every agent has the given status.
    #[must_use]
    pub fn is_all(&self, status: AgentStatus) -> bool {
        Agent::ALL.iter().all(|agent| self.get(*agent) == status)
    }
}
