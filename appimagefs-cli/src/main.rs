//! AppImageFS CLI.
//!
//! Mounts the filesystem and talks to a running instance through its
//! control files.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use appimagefs::config::ConfigFile;
use appimagefs::logging::{self, LoggingGuard};
use clap::{Parser, Subcommand};

use commands::common::resolve_mountpoint;
use commands::config::ConfigCommands;
use commands::mount::MountArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "appimagefs")]
#[command(version, about = "Stable filesystem paths for registered AppImages")]
struct Cli {
    /// Mountpoint (default: $XDG_RUNTIME_DIR/appimagefs)
    #[arg(long, short = 'm', global = true)]
    mountpoint: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mount the filesystem and serve until Ctrl+C (default)
    Mount {
        /// Do not scan for AppImages at startup
        #[arg(long)]
        no_scan: bool,

        /// Directory to scan for AppImages at startup
        #[arg(long, conflicts_with = "no_scan")]
        scan_dir: Option<PathBuf>,

        /// Serve in the foreground with trace logging
        #[arg(long, short = 'd')]
        debug: bool,
    },

    /// Register AppImages with the running instance
    Register {
        /// AppImage files to register
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the registered AppImages
    List,

    /// Unmount the running instance
    Unmount {
        /// Detach even if files are still open
        #[arg(long, short = 'l')]
        lazy: bool,
    },

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Commands {
    fn debug(&self) -> bool {
        matches!(self, Commands::Mount { debug: true, .. })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let command = cli.command.unwrap_or(Commands::Mount {
        no_scan: false,
        scan_dir: None,
        debug: false,
    });

    // Config commands must work even when the file is broken
    if let Commands::Config(command) = command {
        return commands::config::run(command);
    }

    let config = ConfigFile::load()?;
    let _guard = init_logging(&config, command.debug())?;
    let mountpoint = resolve_mountpoint(cli.mountpoint, &config);

    match command {
        Commands::Mount {
            no_scan,
            scan_dir,
            debug,
        } => commands::mount::run(
            MountArgs {
                mountpoint: Some(mountpoint),
                no_scan,
                scan_dir,
                debug,
            },
            &config,
        ),
        Commands::Register { paths } => commands::register::run(&mountpoint, &paths),
        Commands::List => commands::list::run(&mountpoint),
        Commands::Unmount { lazy } => commands::unmount::run(&mountpoint, lazy),
        Commands::Config(_) => Ok(()),
    }
}

fn init_logging(config: &ConfigFile, debug: bool) -> Result<LoggingGuard, CliError> {
    let debug = debug || std::env::var_os(appimagefs::mount::DEBUG_ENV).is_some();
    Ok(logging::init_logging(&config.logging.to_logging_config(debug))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_mount() {
        let cli = Cli::try_parse_from(["appimagefs"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_mount_flags() {
        let cli = Cli::try_parse_from([
            "appimagefs",
            "mount",
            "--mountpoint",
            "/tmp/mnt",
            "--scan-dir",
            "/opt/apps",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.mountpoint, Some(PathBuf::from("/tmp/mnt")));
        match cli.command {
            Some(Commands::Mount {
                no_scan,
                scan_dir,
                debug,
            }) => {
                assert!(!no_scan);
                assert_eq!(scan_dir, Some(PathBuf::from("/opt/apps")));
                assert!(debug);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_scan_conflicts_with_scan_dir() {
        let result =
            Cli::try_parse_from(["appimagefs", "mount", "--no-scan", "--scan-dir", "/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_requires_paths() {
        assert!(Cli::try_parse_from(["appimagefs", "register"]).is_err());
        let cli =
            Cli::try_parse_from(["appimagefs", "register", "a.AppImage", "b.AppImage"]).unwrap();
        match cli.command {
            Some(Commands::Register { paths }) => assert_eq!(paths.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unmount_lazy_flag() {
        let cli = Cli::try_parse_from(["appimagefs", "unmount", "--lazy"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Unmount { lazy: true })));
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["appimagefs", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigCommands::Path))
        ));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
