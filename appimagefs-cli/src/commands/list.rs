//! List command - print the running instance's listing.

use std::fs;
use std::path::Path;

use super::common::{listing_path, require_running};
use crate::error::CliError;

/// Run the list command.
pub fn run(mountpoint: &Path) -> Result<(), CliError> {
    require_running(mountpoint)?;

    let listing = fs::read_to_string(listing_path(mountpoint))?;
    if listing.is_empty() {
        println!("No AppImages registered.");
    } else {
        print!("{}", listing);
    }
    Ok(())
}
