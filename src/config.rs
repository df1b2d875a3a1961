//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_start_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_polls() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_speed_factor() -> f64 {
    1.0
}

/// Largest accepted `simulation.speed_factor`.
pub const MAX_SPEED_FACTOR: f64 = 100.0;

/// Remote backend connectivity and polling cadence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL of the multi-agent backend, e.g. `http://localhost:8000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for the workflow start request.
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    /// Timeout for each status, log or report request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Delay between two poll iterations.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Poll iterations before giving up on a remote workflow.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            start_timeout_ms: default_start_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

/// Local simulation fallback settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SimulationConfig {
    /// Whether an unreachable backend falls back to the local simulation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Multiplier applied to every scripted delay; `0.0` replays instantly.
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_factor: default_speed_factor(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Backend connectivity settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Simulation fallback settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Timeout applied to the workflow start request.
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.start_timeout_ms)
    }

    /// Timeout applied to every other backend request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    /// Delay between poll iterations.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.backend.poll_interval_ms)
    }

    /// Validate values and normalize the base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid value.
    pub fn validate(&mut self) -> Result<()> {
        let base_url = self.backend.base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AppError::Config(
                "backend.base_url must start with http:// or https://".into(),
            ));
        }
        self.backend.base_url = base_url.to_owned();

        if self.backend.start_timeout_ms == 0 || self.backend.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "backend timeouts must be greater than zero".into(),
            ));
        }

        if self.backend.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "backend.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.backend.max_polls == 0 {
            return Err(AppError::Config(
                "backend.max_polls must be greater than zero".into(),
            ));
        }

        let factor = self.simulation.speed_factor;
        if !factor.is_finite() || !(0.0..=MAX_SPEED_FACTOR).contains(&factor) {
            return Err(AppError::Config(format!(
                "simulation.speed_factor must be between 0 and {MAX_SPEED_FACTOR}"
            )));
        }

        Ok(())
    }
}
