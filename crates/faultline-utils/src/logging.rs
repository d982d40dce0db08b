//! # Logging Utilities
//!
//! Logging setup for Faultline using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Pretty (development) and JSON (production) output
//! - Configuration from the environment or from explicit options
//! - Optional daily-rolling file output next to the console
//!
//! Console output goes to **stderr** so command output on stdout stays
//! machine readable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_utils::init_logging;
//!
//! init_logging().expect("Failed to initialize logging");
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=faultline_core=debug`)
//! - `FAULTLINE_LOG_FORMAT`: `json` or `pretty` (default `pretty`)
//! - `FAULTLINE_LOG_FILE`: optional log file path; rotated daily
//!
//! ## Examples
//!
//! ```rust,no_run
//! use faultline_utils::{LogConfig, LogFormat, LogLevel, init_logging_with};
//!
//! let config = LogConfig::from_env().with_level(LogLevel::Debug).with_format(LogFormat::Json);
//! init_logging_with(&config).expect("Failed to initialize logging");
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const FORMAT_ENV: &str = "FAULTLINE_LOG_FORMAT";

/// Environment variable naming an optional log file
pub const FILE_ENV: &str = "FAULTLINE_LOG_FILE";

// Flushes the file writer; lives as long as the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    #[default]
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Resolved logging options
///
/// Filter priority when the subscriber is built:
/// 1. an explicit [`level`](Self::with_level) (e.g. from `--log-level`)
/// 2. `RUST_LOG`, which may carry per-crate directives
/// 3. `info`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig
{
    level: Option<LogLevel>,
    format: LogFormat,
    file: Option<PathBuf>,
}

impl LogConfig
{
    /// Options from `FAULTLINE_LOG_FORMAT` and `FAULTLINE_LOG_FILE`
    ///
    /// An unparsable format falls back to pretty output.
    pub fn from_env() -> Self
    {
        Self::from_vars(
            std::env::var(FORMAT_ENV).ok().as_deref(),
            std::env::var_os(FILE_ENV).map(PathBuf::from),
        )
    }

    fn from_vars(format: Option<&str>, file: Option<PathBuf>) -> Self
    {
        Self {
            level: None,
            format: format.and_then(|s| s.parse().ok()).unwrap_or_default(),
            file: file.filter(|path| !path.as_os_str().is_empty()),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self
    {
        self.file = Some(file.into());
        self
    }

    pub fn level(&self) -> Option<LogLevel>
    {
        self.level
    }

    pub fn format(&self) -> LogFormat
    {
        self.format
    }

    pub fn file(&self) -> Option<&Path>
    {
        self.file.as_deref()
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging() -> Result<(), LoggingError>
{
    init_logging_with(&LogConfig::from_env())
}

/// Initialize logging with an explicit level and format
///
/// `FAULTLINE_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_with(&LogConfig::from_env().with_level(level).with_format(format))
}

/// Initialize logging from resolved options
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with(config: &LogConfig) -> Result<(), LoggingError>
{
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![output_layer(config.format, true, io::stderr)];

    let mut guard = None;
    if let Some(path) = config.file() {
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let file_name = path.file_name().unwrap_or_default();
        let (writer, worker) = tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, file_name));
        layers.push(output_layer(config.format, false, writer));
        guard = Some(worker);
    }

    Registry::default()
        .with(layers)
        .with(config.filter())
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    if let Some(worker) = guard {
        let _ = FILE_GUARD.set(worker);
    }
    Ok(())
}

fn output_layer<W>(format: LogFormat, ansi: bool, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_config_from_vars()
    {
        let config = LogConfig::from_vars(Some("json"), Some(PathBuf::from("logs/faultline.log")));
        assert_eq!(config.format(), LogFormat::Json);
        assert_eq!(config.file(), Some(Path::new("logs/faultline.log")));
        assert_eq!(config.level(), None);

        let config = LogConfig::from_vars(Some("yaml"), Some(PathBuf::new()));
        assert_eq!(config.format(), LogFormat::Pretty);
        assert_eq!(config.file(), None);
    }

    #[test]
    fn test_config_builders()
    {
        let config = LogConfig::default()
            .with_level(LogLevel::Trace)
            .with_format(LogFormat::Json)
            .with_file("out.log");
        assert_eq!(config.level(), Some(LogLevel::Trace));
        assert_eq!(config.format(), LogFormat::Json);
        assert_eq!(config.file(), Some(Path::new("out.log")));
    }
}
