//! # Logging Utilities
//!
//! Logging setup for tools built on kinsight, using `tracing`.
//!
//! The engine itself only emits `tracing` events (type resolutions at
//! `debug`, structural inconsistencies at `warn`, raw reads at `trace`). This
//! module installs a subscriber that renders them:
//! - pretty console output for interactive use, JSON for log collection
//! - filtering through `RUST_LOG`
//! - an optional daily rolling log file next to the console output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kinsight_utils::init_logging;
//!
//! // Reads RUST_LOG, KINSIGHT_LOG_FORMAT and KINSIGHT_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Snapshot loaded");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `RUST_LOG=debug`, `RUST_LOG=kinsight_core::traverse=trace`)
//! - `KINSIGHT_LOG_FORMAT`: `pretty` (default) or `json`
//! - `KINSIGHT_LOG_FILE`: optional path of a log file, rotated daily
//!
//! The returned [`LoggingGuard`] flushes the file writer when dropped; keep it
//! alive for as long as the program logs.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable output (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default level
    #[default]
    Info,
    Debug,
    /// Most verbose; includes every snapshot read
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
        match s.trim().to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug' or 'trace')"
            ))),
        }
    }
}

/// Complete logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig
{
    /// Explicit level; `None` defers to `RUST_LOG`, then `info`
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Log file, rotated daily; `None` logs to the console only
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Configuration from `KINSIGHT_LOG_FORMAT` and `KINSIGHT_LOG_FILE`
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `KINSIGHT_LOG_FORMAT` is set to an unknown format.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match env::var("KINSIGHT_LOG_FORMAT") {
            Ok(format) if !format.trim().is_empty() => format.parse()?,
            _ => LogFormat::default(),
        };
        let file = env::var_os("KINSIGHT_LOG_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            level: None,
            format,
            file,
        })
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
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.file = Some(path.into());
        self
    }

    /// The filter this configuration installs.
    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Keeps the background file writer alive; dropping it flushes pending events
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
/// Returns an error if:
/// - a global subscriber is already installed
/// - `KINSIGHT_LOG_FORMAT` is invalid
/// - the directory of `KINSIGHT_LOG_FILE` cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LogConfig::from_env()?)
}

/// Initialize console logging with an explicit level and format
///
/// ## Example
///
/// ```rust,no_run
/// use kinsight_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LogConfig::default().with_level(level).with_format(format))
}

/// Initialize logging from a [`LogConfig`]
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging_with(config: &LogConfig) -> Result<LoggingGuard, LoggingError>
{
    let (file, guard) = match &config.file {
        Some(path) => {
            let (layer, guard) = file_layer(path, config.format, config.filter())?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console_layer(config.format, config.filter()))
        .with(file)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    tracing::debug!(
        format = ?config.format,
        file = ?config.file,
        started = %Utc::now().to_rfc3339(),
        "Logging initialized"
    );
    Ok(LoggingGuard { _file: guard })
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

fn console_layer<S>(format: LogFormat, filter: EnvFilter) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer<S>(
    path: &Path,
    format: LogFormat,
    filter: EnvFilter,
) -> Result<(BoxedLayer<S>, WorkerGuard), LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InitializationFailed(format!("'{}' is not a file path", path.display())))?;

    let appender = tracing_appender::rolling::daily(&directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);

    let layer = match format {
        LogFormat::Pretty => layer.with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    };
    Ok((layer, guard))
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

    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Log file could not be set up
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
