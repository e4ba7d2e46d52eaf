//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand, ValueEnum};
use commands::{DispatchCommand, HistoryCommand, RunCommand, ValidateCommand, WatchCommand};
use std::ffi::OsString;

/// Build a static site and publish it to a git branch
#[derive(Debug, Parser, Clone)]
#[command(name = "sitepipe")]
#[command(version)]
#[command(about = "Build a static site and publish it to a git branch", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Full)]
    pub log_format: LogFormat,
}

/// How log lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Full,
    Compact,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build and publish a branch (push trigger)
    Run(RunCommand),

    /// Start a run with manual inputs
    Dispatch(DispatchCommand),

    /// Poll for pushes and run on each
    Watch(WatchCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch() {
        let cli = Cli::try_parse_from([
            "sitepipe",
            "-v",
            "dispatch",
            "-f",
            "deploy.yml",
            "--ref",
            "main",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Dispatch(cmd) => {
                assert_eq!(cmd.git_ref.as_deref(), Some("main"));
                assert_eq!(cmd.log_level.as_deref(), Some("debug"));
                assert!(cmd.tags.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["sitepipe", "run", "--file", "deploy.yml"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Full);
        match cli.command {
            Command::Run(cmd) => {
                assert!(cmd.branch.is_none());
                assert!(!cmd.no_history);
                assert!(!cmd.keep_workspace);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_watch_interval() {
        let cli =
            Cli::try_parse_from(["sitepipe", "watch", "-f", "deploy.yml", "-i", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Watch(ref cmd) if cmd.interval == 5));
    }
}
