//! # Logging Utilities
//!
//! Logging infrastructure for guardmap using `tracing`.
//!
//! Reports go to stdout, so every log layer writes to stderr or a file. The
//! default level is `warn`: a plain run prints only the report, plus warnings
//! about unreadable memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardmap_utils::init_logging;
//!
//! // Keep the guard alive until exit so file logs are flushed
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::warn!("bitmap page unreadable");
//! tracing::debug!("located CFG bitmap");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter (e.g., `RUST_LOG=debug`, `RUST_LOG=guardmap_core::locator=debug`)
//! - `GUARDMAP_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `GUARDMAP_LOG_FILE`: Optional log file; a directory gets a dated file name
//!
//! ## Examples
//!
//! ```rust,no_run
//! use guardmap_utils::{init_logging_with, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::from_env().with_level(LogLevel::Debug).with_format(LogFormat::Json);
//! let _guard = init_logging_with(&config).expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self as tracing_fmt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "GUARDMAP_LOG_FORMAT";

/// Environment variable naming a log file or directory
pub const LOG_FILE_ENV: &str = "GUARDMAP_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default)
    Warn,
    /// Info level
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

impl fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&Level::from(*self), f)
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// How logging should be set up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; wins over `RUST_LOG`
    pub level: Option<LogLevel>,
    /// Output format
    pub format: LogFormat,
    /// Log file or directory, in addition to stderr
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `GUARDMAP_LOG_FORMAT` and `GUARDMAP_LOG_FILE`.
    ///
    /// An unparseable format falls back to pretty. `RUST_LOG` is read later,
    /// when the filter is built.
    pub fn from_env() -> Self
    {
        let format = env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = env::var_os(LOG_FILE_ENV).filter(|path| !path.is_empty()).map(PathBuf::from);

        Self {
            level: None,
            format,
            file,
        }
    }

    /// Override the level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    /// Override the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    /// Build the filter.
    ///
    /// Priority:
    /// 1. explicit level (from `--log-level`)
    /// 2. `RUST_LOG`, which allows per-module filters
    /// 3. `warn`
    fn filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            return EnvFilter::new(level.to_string());
        }

        match env::var("RUST_LOG") {
            Ok(rust_log) => EnvFilter::try_new(&rust_log).unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
            Err(_) => EnvFilter::new(Level::WARN.to_string()),
        }
    }
}

/// Keeps the background file writer alive
///
/// Dropping it flushes and stops file logging; hold it until the program
/// exits.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env())
}

/// Initialize logging with an explicit level, other settings from the
/// environment
///
/// ## Errors
///
/// See [`init_logging`].
pub fn init_logging_with_level(level: LogLevel) -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env().with_level(level))
}

/// Initialize logging from a config
///
/// ## Errors
///
/// See [`init_logging`].
pub fn init_logging_with(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];

    let mut file_guard = None;
    if let Some(path) = &config.file {
        let path = resolve_log_file(path)?;
        let directory = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        std::fs::create_dir_all(&directory)?;
        let file_name = path.file_name().unwrap_or_default();

        // The date is already part of directory-derived names, so never roll.
        let appender = tracing_appender::rolling::never(&directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let layer = match config.format {
            LogFormat::Pretty => tracing_fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_filter(config.filter())
                .boxed(),
            LogFormat::Json => tracing_fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(config.filter())
                .boxed(),
        };
        layers.push(layer);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file: file_guard })
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer
{
    match config.format {
        LogFormat::Pretty => tracing_fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_filter(config.filter())
            .boxed(),
        LogFormat::Json => tracing_fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(config.filter())
            .boxed(),
    }
}

/// Where file logs go for a configured path.
///
/// An existing directory gets `YYYY-MM-DD-guardmap.log` inside it; anything
/// else is used as the file path.
///
/// ## Errors
///
/// `InvalidPath` if the path is empty.
pub fn resolve_log_file(path: &Path) -> Result<PathBuf, LoggingError>
{
    if path.as_os_str().is_empty() {
        return Err(LoggingError::InvalidPath(path.to_path_buf()));
    }

    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        return Ok(path.join(format!("{today}-guardmap.log")));
    }

    Ok(path.to_path_buf())
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Unusable log file path
    #[error("Invalid log file path: {0:?}")]
    InvalidPath(PathBuf),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
