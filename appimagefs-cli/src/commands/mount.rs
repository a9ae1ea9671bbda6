//! Mount command - serve the filesystem until interrupted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use appimagefs::config::ConfigFile;
use appimagefs::mount::{self, MountConfig};
use appimagefs::{AppImageFs, Registry};
use tracing::{info, warn};

use super::common::resolve_mountpoint;
use crate::error::CliError;

/// How often the supervisor checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Arguments for the mount command.
#[derive(Debug, Default)]
pub struct MountArgs {
    pub mountpoint: Option<PathBuf>,
    pub no_scan: bool,
    pub scan_dir: Option<PathBuf>,
    pub debug: bool,
}

impl MountArgs {
    /// Mount settings after applying CLI overrides to the config file.
    pub fn mount_config(&self, config: &ConfigFile) -> MountConfig {
        let mut mount_config =
            MountConfig::new(resolve_mountpoint(self.mountpoint.clone(), config))
                .with_allow_other(config.mount.allow_other)
                .from_env();
        // --debug only switches debug on; APPIMAGEFS_DEBUG may already have
        mount_config.debug |= self.debug;
        mount_config
    }

    /// Directory to scan at startup, if any.
    pub fn scan_dir(&self, config: &ConfigFile) -> Option<PathBuf> {
        if self.no_scan {
            return None;
        }
        if self.scan_dir.is_some() {
            return self.scan_dir.clone();
        }
        if config.registry.scan_on_start {
            config.registry.scan_dir.clone()
        } else {
            None
        }
    }
}

/// Run the mount command.
pub fn run(args: MountArgs, config: &ConfigFile) -> Result<(), CliError> {
    let mount_config = args.mount_config(config);

    let registry = Arc::new(Registry::new());
    if let Some(dir) = args.scan_dir(config) {
        if dir.is_dir() {
            let added = registry.scan_directory(&dir);
            info!(dir = %dir.display(), added, "Scanned for AppImages");
        } else {
            warn!(dir = %dir.display(), "Scan directory does not exist, skipping");
        }
    }
    let fs = Arc::new(AppImageFs::new(registry));

    println!("AppImageFS v{}", appimagefs::VERSION);
    println!("Mountpoint: {}", mount_config.mountpoint.display());
    println!("Registered: {}", fs.registry().len());
    println!();

    if mount_config.debug {
        println!("Debug mode: serving in the foreground, unmount to exit");
        mount::mount(fs, &mount_config)?;
        return Ok(());
    }

    let session = mount::spawn_mount(fs, &mount_config)?;
    println!("Press Ctrl+C to unmount and exit");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    while !shutdown.load(Ordering::SeqCst) {
        if !session.is_active() {
            info!("Filesystem was unmounted externally");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    println!();
    println!("Unmounting...");
    session.unmount();
    println!("Filesystem unmounted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_scan(dir: Option<&str>, on_start: bool) -> ConfigFile {
        let mut config = ConfigFile::default();
        config.registry.scan_dir = dir.map(PathBuf::from);
        config.registry.scan_on_start = on_start;
        config
    }

    #[test]
    fn test_no_scan_wins() {
        let args = MountArgs {
            no_scan: true,
            scan_dir: Some(PathBuf::from("/opt/apps")),
            ..Default::default()
        };
        assert_eq!(args.scan_dir(&config_with_scan(Some("/x"), true)), None);
    }

    #[test]
    fn test_cli_scan_dir_overrides_config() {
        let args = MountArgs {
            scan_dir: Some(PathBuf::from("/opt/apps")),
            ..Default::default()
        };
        let config = config_with_scan(Some("/x"), false);
        assert_eq!(args.scan_dir(&config), Some(PathBuf::from("/opt/apps")));
    }

    #[test]
    fn test_config_scan_respects_scan_on_start() {
        let args = MountArgs::default();
        assert_eq!(
            args.scan_dir(&config_with_scan(Some("/x"), true)),
            Some(PathBuf::from("/x"))
        );
        assert_eq!(args.scan_dir(&config_with_scan(Some("/x"), false)), None);
    }

    #[test]
    fn test_mount_config_overrides() {
        let mut config = ConfigFile::default();
        config.mount.allow_other = true;
        let args = MountArgs {
            mountpoint: Some(PathBuf::from("/tmp/mnt")),
            debug: true,
            ..Default::default()
        };

        let mount_config = args.mount_config(&config);
        assert_eq!(mount_config.mountpoint, PathBuf::from("/tmp/mnt"));
        assert!(mount_config.allow_other);
        assert!(mount_config.debug);
    }
}
