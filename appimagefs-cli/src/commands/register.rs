//! Register command - hand AppImages to a running instance.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::common::{listing_path, register_path, require_running};
use crate::error::CliError;

/// Run the register command.
pub fn run(mountpoint: &Path, paths: &[PathBuf]) -> Result<(), CliError> {
    require_running(mountpoint)?;

    let absolute = paths
        .iter()
        .map(|path| {
            fs::canonicalize(path).map_err(|source| CliError::BadPath {
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = registration_payload(&absolute);
    {
        let mut channel = OpenOptions::new()
            .write(true)
            .open(register_path(mountpoint))?;
        channel.write_all(payload.as_bytes())?;
        // Registration happens when the channel is closed
    }
    debug!(count = absolute.len(), "Wrote registration request");

    let listing = fs::read_to_string(listing_path(mountpoint))?;
    for path in &absolute {
        match find_entry(&listing, path) {
            Some(name) => println!("{} -> {}", name, path.display()),
            None => eprintln!("Not registered: {}", path.display()),
        }
    }
    Ok(())
}

/// One path per line, newline-terminated.
fn registration_payload(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("{}\n", path.display()))
        .collect()
}

/// Entry name the listing shows for `path`.
fn find_entry<'a>(listing: &'a str, path: &Path) -> Option<&'a str> {
    let target = path.to_string_lossy();
    listing.lines().find_map(|line| {
        let (name, mapped) = line.split_once(" -> ")?;
        (mapped == target).then_some(name)
    })
}
