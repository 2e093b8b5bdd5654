//! Logging setup on the `tracing` ecosystem.
//!
//! The library itself only emits events; a host (or a test) calls one of the
//! `init_*` functions once to install a subscriber.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full tracing filter, takes precedence (e.g. "circleforge=trace")
//! - `CIRCLEFORGE_LOG_LEVEL`: error, warn, info, debug or trace
//! - `CIRCLEFORGE_LOG_FORMAT`: "human" or "json"
//! - `CIRCLEFORGE_LOG_FILE`: optional file receiving a JSON copy of every event

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "CIRCLEFORGE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "CIRCLEFORGE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "CIRCLEFORGE_LOG_FILE";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("failed to open log file {}: {reason}", .path.display())]
    FileOpenFailed { path: PathBuf, reason: String },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Human,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(LogFormat::Human),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Emit source file and line with each event
    pub with_file_info: bool,
    /// Emit an event when a span closes
    pub with_span_events: bool,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    pub fn with_span_events(mut self, with_span_events: bool) -> Self {
        self.with_span_events = with_span_events;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Read the `CIRCLEFORGE_LOG_*` variables; unset ones keep their default,
    /// unparsable ones are errors.
    pub fn from_env() -> Result<Self, LoggingError> {
        let mut config = Self::new();
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.level =
                LogLevel::parse(&level).ok_or(LoggingError::InvalidLogLevel(level))?;
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.format =
                LogFormat::parse(&format).ok_or(LoggingError::InvalidLogFormat(format))?;
        }
        if let Ok(file) = std::env::var(LOG_FILE_ENV) {
            config = config.with_log_file(file);
        }
        Ok(config)
    }
}

/// Initialize from the environment, ignoring failures.
///
/// Idempotent; intended for binaries and tests that just want output.
pub fn init_logging_default() {
    if let Err(e) = init_logging_from_env() {
        eprintln!("circleforge: logging not initialized: {}", e);
    }
}

/// Initialize from the environment.
///
/// Only the first successful call installs a subscriber; later calls are
/// no-ops.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    if is_initialized() {
        return Ok(());
    }
    init_with_config(&LoggingConfig::from_env()?)
}

/// Initialize with an explicit configuration. Idempotent.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    TRACING_INITIALIZED
        .get_or_try_init(|| install(config))
        .map(|_| ())
}

pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config.level)?;

    // The file copy is always JSON, whatever the console format.
    let file_layer = match &config.log_file {
        Some(path) => Some(
            fmt::layer()
                .json()
                .with_writer(Mutex::new(open_log_file(path)?))
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events(config.with_span_events)),
        ),
        None => None,
    };

    let console = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
        LogFormat::Human => fmt::layer()
            .with_target(true)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let open_failed = |e: std::io::Error| LoggingError::FileOpenFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(open_failed)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_failed)
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// `RUST_LOG` wins over the configured level.
fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)
            .map_err(|e| LoggingError::InvalidLogLevel(e.to_string())),
        Err(_) => Ok(EnvFilter::new(level.as_filter_str())),
    }
}
