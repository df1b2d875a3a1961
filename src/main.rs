#![forbid(unsafe_code)]

//! `workflow-sync`: run a multi-agent analysis and follow its progress.
//!
//! Starts a workflow on the configured backend (or the local simulation
//! when the backend is unreachable), prints log entries as they arrive and
//! stops the run on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use workflow_sync::backend::http::HttpBackend;
use workflow_sync::backend::WorkflowBackend;
use workflow_sync::clock::SystemClock;
use workflow_sync::models::{LogEntry, LogLevel, WorkflowSession};
use workflow_sync::orchestrator::session_controller::{
    ControllerSettings, SessionController, StartOutcome,
};
use workflow_sync::orchestrator::Terminal;
use workflow_sync::store::{LogCursor, StateStore};
use workflow_sync::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "workflow-sync",
    about = "Follow a multi-agent analysis workflow",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an analysis and follow it until it finishes.
    Run {
        /// Natural-language analysis query.
        #[arg(long)]
        query: String,

        /// Demo case identifier.
        #[arg(long)]
        demo_id: String,

        /// Write the report here once a remote run completes.
        #[arg(long)]
        download: Option<PathBuf>,
    },

    /// Download the report of an existing remote workflow.
    Download {
        /// Remote workflow identifier.
        #[arg(long)]
        workflow_id: String,

        /// Destination file.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Runtime(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(base_url) = args.base_url {
        config.backend.base_url = base_url;
        config.validate()?;
    }
    info!(base_url = %config.backend.base_url, "configuration loaded");

    let backend = Arc::new(HttpBackend::from_config(&config));

    match args.command {
        Command::Run {
            query,
            demo_id,
            download,
        } => follow(&config, backend, &query, &demo_id, download).await,
        Command::Download { workflow_id, out } => {
            let report = backend.download_report(&workflow_id).await?;
            tokio::fs::write(&out, &report).await?;
            info!(path = %out.display(), bytes = report.len(), "report saved");
            Ok(())
        }
    }
}

async fn follow(
    config: &GlobalConfig,
    backend: Arc<HttpBackend>,
    query: &str,
    demo_id: &str,
    download: Option<PathBuf>,
) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(StateStore::new(clock.clone()));
    let controller = SessionController::new(
        backend,
        Arc::clone(&store),
        clock,
        ControllerSettings::from_config(config),
    );

    let printer = tokio::spawn(print_logs(store.subscribe()));

    match controller.start(query, demo_id).await {
        StartOutcome::Started { strategy, .. } => info!(?strategy, "run started"),
        StartOutcome::Unavailable { reason, .. } => {
            error!(%reason, "backend unavailable");
        }
        StartOutcome::AlreadyRunning | StartOutcome::Aborted { .. } => {}
    }

    let outcome = tokio::select! {
        outcome = controller.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping run");
            controller.stop().await;
            None
        }
    };

    // Let the printer flush the final state before exiting.
    tokio::task::yield_now().await;
    printer.abort();

    if let (Some(Ok(Terminal::Completed)), Some(path)) = (outcome, download) {
        match controller.download_report().await {
            Ok(report) => {
                tokio::fs::write(&path, &report).await?;
                info!(path = %path.display(), bytes = report.len(), "report saved");
            }
            Err(err) => error!(%err, "report download failed"),
        }
    }

    Ok(())
}

/// Print every log entry once, following snapshot replacements and clears.
async fn print_logs(mut rx: watch::Receiver<WorkflowSession>) {
    let mut cursor = LogCursor::default();
    loop {
        {
            let session = rx.borrow_and_update();
            for entry in cursor.fresh(&session.logs) {
                println!("{}", render(entry));
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn render(entry: &LogEntry) -> String {
    let level = match entry.level {
        LogLevel::Info => "INFO",
        LogLevel::Success => " OK ",
        LogLevel::Warning => "WARN",
        LogLevel::Error => "FAIL",
    };
    let agent = entry.agent.as_deref().unwrap_or("-");
    match &entry.details {
        Some(details) => format!("[{level}] {agent}: {} {details}", entry.message),
        None => format!("[{level}] {agent}: {}", entry.message),
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
