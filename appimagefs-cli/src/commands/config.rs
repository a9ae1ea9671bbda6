//! Configuration commands.
//!
//! `config path` shows where the file lives and `config list` prints the
//! effective settings.

use appimagefs::config::{config_file_path, ConfigFile};
use clap::Subcommand;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    let mut current_section = String::new();
    for (key, value) in config.entries() {
        let Some((section, name)) = key.split_once('.') else {
            continue;
        };
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section.to_string();
        }

        if value.is_empty() {
            println!("  {} = (not set)", name);
        } else {
            println!("  {} = {}", name, value);
        }
    }
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path()?.display());
    Ok(())
}
