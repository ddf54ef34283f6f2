//! Subscriber setup for binaries embedding AutoLog.
//!
//! The interceptor only emits `tracing` events (target `autolog`); whoever
//! owns `main` decides where they go. This installs a JSON or human-readable
//! subscriber with an `EnvFilter`, optionally writing to a file.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, event fields included.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::InvalidFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info,autolog=debug`.
    pub level: String,
    /// Write to this file instead of stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

impl LogConfig {
    /// Read `AUTOLOG_LOG_FORMAT`, `AUTOLOG_LOG_FILTER` (or `RUST_LOG`) and
    /// `AUTOLOG_LOG_FILE`. Invalid or missing values keep the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let format = std::env::var("AUTOLOG_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.format);
        let level = std::env::var("AUTOLOG_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.level);
        let output_path = std::env::var("AUTOLOG_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Self {
            format,
            level,
            output_path,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    let file = match &config.output_path {
        Some(path) => Some(std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match (config.format, file) {
        (LogFormat::Json, Some(file)) => registry
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .try_init(),
        (LogFormat::Json, None) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, Some(file)) => registry
            .with(fmt::layer().pretty().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .try_init(),
        (LogFormat::Pretty, None) => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}
