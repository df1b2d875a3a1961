//! Deterministic local stand-in for the remote pipeline.
//!
//! The engine replays a fixed [`ScriptStep`] list: every step waits its
//! delay, then applies one agent transition and one log entry. Given no
//! cancellation, two runs produce identical logs and an identical final
//! status map.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Terminal;
use crate::clock::Clock;
use crate::models::{Agent, AgentStatus, LogEntry, LogLevel, RunState};
use crate::store::StateStore;
use crate::{AppError, Result};

/// SQL statements echoed by the simulated `DuckDB` tool.
pub const SIMULATED_QUERIES: [&str; 3] = [
    "SELECT SUM(revenue) FROM orders WHERE status = 'paid'",
    "SELECT channel, COUNT(*) FROM customers GROUP BY channel",
    "SELECT AVG(order_value) FROM order_items",
];

/// One scripted transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Wait before applying the step.
    pub delay: Duration,
    /// Agent status change, if any.
    pub transition: Option<(Agent, AgentStatus)>,
    /// New current-step text, if any.
    pub current_step: Option<&'static str>,
    /// Entry appended when the step is applied.
    pub log: LogEntry,
}

impl ScriptStep {
    fn new(delay_ms: u64, log: LogEntry) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            transition: None,
            current_step: None,
            log,
        }
    }

    fn transition(mut self, agent: Agent, status: AgentStatus) -> Self {
        self.transition = Some((agent, status));
        self
    }

    fn step(mut self, text: &'static str) -> Self {
        self.current_step = Some(text);
        self
    }
}

fn agent_log(agent: Agent, level: LogLevel, message: impl Into<String>) -> LogEntry {
    LogEntry::new(level, message).with_agent(agent.label())
}

fn kpi_details() -> Value {
    json!({
        "revenue": "782,517.00 €",
        "aov": "863.71 €",
        "orders": "906",
        "gross_margin": "42.84%",
    })
}

fn report_details() -> Value {
    json!({
        "word_count": 377,
        "sections": ["Executive Summary", "KPI Analysis", "Recommendations"],
    })
}

/// The five-stage demo pipeline.
#[must_use]
pub fn demo_script() -> Vec<ScriptStep> {
    use Agent::{DataAnalyst, DuckdbTool, Orchestrator, ReportGenerator};
    use AgentStatus::{Active, Completed};

    let mut script = vec![
        ScriptStep::new(
            0,
            agent_log(Orchestrator, LogLevel::Info, "Orchestrator: classification started"),
        )
        .transition(Orchestrator, Active)
        .step("Orchestrator classifying request"),
        ScriptStep::new(
            2000,
            agent_log(Orchestrator, LogLevel::Success, "Orchestrator: request classified"),
        )
        .transition(Orchestrator, Completed),
        ScriptStep::new(
            0,
            agent_log(DataAnalyst, LogLevel::Info, "Data analyst: analysis started"),
        )
        .transition(DataAnalyst, Active)
        .step("Data analysis running"),
        ScriptStep::new(
            0,
            agent_log(DuckdbTool, LogLevel::Info, "DuckDB tool: queries started"),
        )
        .transition(DuckdbTool, Active),
    ];

    for (index, sql) in SIMULATED_QUERIES.iter().enumerate() {
        script.push(ScriptStep::new(
            1000,
            agent_log(
                DuckdbTool,
                LogLevel::Info,
                format!("DuckDB tool: SQL query {}: {sql}", index + 1),
            ),
        ));
    }

    script.extend([
        ScriptStep::new(
            500,
            agent_log(DuckdbTool, LogLevel::Success, "DuckDB tool: all queries succeeded"),
        )
        .transition(DuckdbTool, Completed),
        ScriptStep::new(
            1000,
            agent_log(DataAnalyst, LogLevel::Success, "Data analyst: KPIs calculated")
                .with_details(kpi_details()),
        )
        .transition(DataAnalyst, Completed),
        ScriptStep::new(
            0,
            agent_log(
                ReportGenerator,
                LogLevel::Info,
                "Report generator: drafting report",
            ),
        )
        .transition(ReportGenerator, Active)
        .step("Generating report"),
        ScriptStep::new(
            3000,
            agent_log(
                ReportGenerator,
                LogLevel::Success,
                "Report generator: report finished",
            )
            .with_details(report_details()),
        )
        .transition(ReportGenerator, Completed),
    ]);

    script
}

/// Clears the in-progress flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Replays a script into the state store.
pub struct SimulationEngine {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    script: Vec<ScriptStep>,
    speed_factor: f64,
    in_progress: AtomicBool,
}

impl SimulationEngine {
    /// Engine replaying [`demo_script`] at the given speed.
    #[must_use]
    pub fn new(store: Arc<StateStore>, clock: Arc<dyn Clock>, speed_factor: f64) -> Self {
        Self::with_script(store, clock, demo_script(), speed_factor)
    }

    /// Engine replaying a custom script.
    #[must_use]
    pub fn with_script(
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        script: Vec<ScriptStep>,
        speed_factor: f64,
    ) -> Self {
        Self {
            store,
            clock,
            script,
            speed_factor,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Whether a replay is currently in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Replay the script for `session_id`.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyRunning` if another replay is in progress; nothing
    ///   is written.
    /// - `AppError::Cancelled` once `cancel` fires; no further steps or logs
    ///   are written.
    pub async fn run(&self, session_id: &str, cancel: &CancellationToken) -> Result<Terminal> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.in_progress);

        info!(session_id, steps = self.script.len(), "simulation started");

        for (index, step) in self.script.iter().enumerate() {
            let delay = self.scaled(step.delay);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AppError::Cancelled),
                    () = self.clock.sleep(delay) => {}
                }
            }

            let applied = self.store.update_unless_cancelled(cancel, |session, now| {
                if let Some((agent, status)) = step.transition {
                    session.workflow_status.set(agent, status);
                }
                if let Some(text) = step.current_step {
                    text.clone_into(&mut session.current_step);
                }
                session.push_log(now, step.log.clone());
            });
            if !applied {
                debug!(session_id, index, "simulation cancelled");
                return Err(AppError::Cancelled);
            }
        }

        let applied = self.store.update_unless_cancelled(cancel, |session, now| {
            session.run_state = RunState::Completed;
            "Workflow completed".clone_into(&mut session.current_step);
            session.push_log(
                now,
                LogEntry::system(LogLevel::Success, "Workflow completed successfully"),
            );
        });
        if !applied {
            return Err(AppError::Cancelled);
        }

        info!(session_id, "simulation completed");
        Ok(Terminal::Completed)
    }

    /// Scale `delay` by the speed factor, saturating instead of panicking on
    /// out-of-range products.
    fn scaled(&self, delay: Duration) -> Duration {
        let secs = delay.as_secs_f64() * self.speed_factor;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
