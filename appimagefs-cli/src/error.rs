//! CLI error type.

use std::path::PathBuf;

use appimagefs::config::ConfigError;
use appimagefs::logging::LoggingError;
use appimagefs::FsError;
use thiserror::Error;

/// Errors surfaced to the user by the `appimagefs` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No AppImageFS instance is mounted at {}", .0.display())]
    NotRunning(PathBuf),

    #[error("Cannot register {}: {source}", .path.display())]
    BadPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unmount {}", .0.display())]
    UnmountFailed(PathBuf),

    #[error("Failed to set signal handler: {0}")]
    Signal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_errors_display_transparently() {
        let path = PathBuf::from("/run/user/1/appimagefs");
        let err: CliError = FsError::AlreadyRunning(path.clone()).into();
        assert_eq!(err.to_string(), FsError::AlreadyRunning(path).to_string());
    }

    #[test]
    fn test_not_running_names_mountpoint() {
        let err = CliError::NotRunning(PathBuf::from("/tmp/mnt"));
        assert!(err.to_string().contains("/tmp/mnt"));
    }
}
