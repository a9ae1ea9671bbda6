//! Helpers shared across commands.

use std::path::{Path, PathBuf};

use appimagefs::config::ConfigFile;
use appimagefs::fuse::{LISTING_NAME, REGISTER_NAME};
use appimagefs::mount::is_mounted;

use crate::error::CliError;

/// Mountpoint from the command line, else from the config file.
pub fn resolve_mountpoint(cli: Option<PathBuf>, config: &ConfigFile) -> PathBuf {
    cli.unwrap_or_else(|| config.mount.mountpoint.clone())
}

/// Fail unless an instance is mounted at `mountpoint`.
pub fn require_running(mountpoint: &Path) -> Result<(), CliError> {
    if is_mounted(mountpoint) {
        Ok(())
    } else {
        Err(CliError::NotRunning(mountpoint.to_path_buf()))
    }
}

/// Path of the listing file under a mountpoint.
pub fn listing_path(mountpoint: &Path) -> PathBuf {
    mountpoint.join(LISTING_NAME)
}

/// Path of the registration channel under a mountpoint.
pub fn register_path(mountpoint: &Path) -> PathBuf {
    mountpoint.join(REGISTER_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_mountpoint_wins() {
        let config = ConfigFile::default();
        assert_eq!(
            resolve_mountpoint(Some(PathBuf::from("/tmp/x")), &config),
            PathBuf::from("/tmp/x")
        );
        assert_eq!(resolve_mountpoint(None, &config), config.mount.mountpoint);
    }

    #[test]
    fn test_control_file_paths() {
        let mp = Path::new("/run/user/1000/appimagefs");
        assert_eq!(listing_path(mp), mp.join("map"));
        assert_eq!(register_path(mp), mp.join("register"));
    }

    #[test]
    fn test_unmounted_directory_is_not_running() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            require_running(temp.path()),
            Err(CliError::NotRunning(_))
        ));
    }
}
