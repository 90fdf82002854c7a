//! Command-line interface for safeguard.
//!
//! This module provides the CLI structure and command handlers for the
//! `safeguard` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AlertCommand, AlertStatusArg, AlertsCommand, CategoryCommand, ConfigCommand, EditCommand,
    GroupCommand, HistoryCommand, ListenCommand, OutputFormat, SourceArg, StatusCommand,
    SubjectCommand,
};

/// safeguard - Raise an emergency alert with the power button
///
/// Press the power button five times in quick succession to raise an alert
/// for the signed-in subject. The CLI also manages the local alert store.
#[derive(Debug, Parser)]
#[command(name = "safeguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch for the power button gesture in the foreground
    Listen(ListenCommand),

    /// Send, end or show your own alert
    #[command(subcommand)]
    Alert(AlertCommand),

    /// Alerts across all subjects
    #[command(subcommand)]
    Alerts(AlertsCommand),

    /// Browse and edit past alerts
    #[command(subcommand)]
    History(HistoryCommand),

    /// Manage subjects
    #[command(subcommand)]
    Subject(SubjectCommand),

    /// Manage groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Manage alert categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Show store and configuration status
    Status(StatusCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "safeguard");
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;

        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_listen() {
        let cli = Cli::try_parse_from(["safeguard", "listen"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Listen(ListenCommand { source: None })
        ));

        let cli = Cli::try_parse_from(["safeguard", "listen", "--source", "acpi"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Listen(ListenCommand {
                source: Some(SourceArg::Acpi)
            })
        ));
    }

    #[test]
    fn test_parse_alert_send_with_location() {
        let cli = Cli::try_parse_from([
            "safeguard",
            "alert",
            "send",
            "--latitude",
            "4.6",
            "--longitude",
            "-74.08",
        ])
        .unwrap();
        match cli.command {
            Command::Alert(AlertCommand::Send {
                latitude,
                longitude,
                message,
                json,
            }) => {
                assert_eq!(latitude, Some(4.6));
                assert_eq!(longitude, Some(-74.08));
                assert!(message.is_none());
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_alert_send_needs_both_coordinates() {
        let result = Cli::try_parse_from(["safeguard", "alert", "send", "--latitude", "4.6"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_history_edit() {
        let cli = Cli::try_parse_from([
            "safeguard",
            "history",
            "edit",
            "abc",
            "--status",
            "terminated",
            "-m",
            "resolved",
        ])
        .unwrap();
        match cli.command {
            Command::History(HistoryCommand::Edit(edit)) => {
                assert_eq!(edit.id, "abc");
                assert_eq!(edit.status, Some(AlertStatusArg::Terminated));
                assert_eq!(edit.message.as_deref(), Some("resolved"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_history_list_defaults() {
        let cli = Cli::try_parse_from(["safeguard", "history", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::History(HistoryCommand::List {
                limit: 20,
                format: OutputFormat::Table
            })
        ));
    }

    #[test]
    fn test_parse_subject_add() {
        let cli = Cli::try_parse_from([
            "safeguard", "subject", "add", "s1", "--name", "Ana", "--group", "g1",
        ])
        .unwrap();
        match cli.command {
            Command::Subject(SubjectCommand::Add {
                id, name, group, ..
            }) => {
                assert_eq!(id, "s1");
                assert_eq!(name, "Ana");
                assert_eq!(group.as_deref(), Some("g1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["safeguard", "status", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Status(StatusCommand { json: true })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["safeguard", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["safeguard", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["safeguard", "status", "-q"]).unwrap();
        assert!(cli.quiet);
    }
}
