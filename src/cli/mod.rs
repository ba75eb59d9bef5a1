//! CLI command definitions for task-tracker.
//!
//! The main entry point is the `Cli` struct; without a subcommand the HTTP
//! server starts.

pub mod create_user;

use clap::{Parser, Subcommand};
use create_user::CreateUserArgs;
use std::path::PathBuf;

/// Task tracker HTTP service and admin tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to attachment directory (overrides config)
    #[arg(short, long, global = true)]
    pub media_dir: Option<PathBuf>,

    /// HTTP port (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,

    /// Create an account, optionally with administrator rights
    CreateUser(CreateUserArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["task-tracker"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "task-tracker",
            "create-user",
            "--email",
            "root@example.com",
            "--password",
            "hunter22",
            "--superuser",
            "--database",
            "/tmp/t.db",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/t.db")));
        match cli.command {
            Some(Command::CreateUser(args)) => {
                assert_eq!(args.email, "root@example.com");
                assert!(args.superuser);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_port_flag() {
        let cli = Cli::try_parse_from(["task-tracker", "serve", "--port", "9001"]).unwrap();
        assert_eq!(cli.port, Some(9001));
        assert!(matches!(cli.command, Some(Command::Serve)));
    }
}
