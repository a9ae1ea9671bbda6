//! Logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr and, when configured,
//! to a log file through a non-blocking writer. `RUST_LOG` takes precedence
//! over the configured level.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default filter level.
pub const DEFAULT_LEVEL: &str = "info";

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional log file, appended to.
    pub file: Option<PathBuf>,
    /// Force `trace` level.
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive this config resolves to when `RUST_LOG` is unset.
    pub fn directive(&self) -> &str {
        if self.debug {
            "trace"
        } else {
            &self.level
        }
    }
}

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("Failed to create log directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Keeps the file writer flushing until dropped.
///
/// Hold this for the lifetime of the program; buffered lines are written out
/// when it goes out of scope.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(config)?;
    let timer = local_timer();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(config.debug);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer)
                .with_target(true);
            (Some(layer.boxed()), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.directive();
    EnvFilter::try_new(directive).map_err(|_| LoggingError::InvalidLevel(directive.to_string()))
}

/// RFC 3339 timestamps in local time, or UTC when the offset is unknown.
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "appimagefs.log".into());
    let appender = tracing_appender::rolling::never(&dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
