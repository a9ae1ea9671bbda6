//! Unmount command - detach a running or stale mount.

use std::path::Path;

use appimagefs::mount::{self, is_mounted};

use crate::error::CliError;

/// Run the unmount command.
pub fn run(mountpoint: &Path, lazy: bool) -> Result<(), CliError> {
    if !is_mounted(mountpoint) {
        println!("Nothing mounted at {}", mountpoint.display());
        return Ok(());
    }

    if mount::unmount(mountpoint, lazy) {
        println!("Unmounted {}", mountpoint.display());
        Ok(())
    } else {
        Err(CliError::UnmountFailed(mountpoint.to_path_buf()))
    }
}
