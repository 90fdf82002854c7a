//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::alert::{AlertStatus, AlertUpdate};
use crate::config::SourceKind;

/// Listen command arguments.
#[derive(Debug, Args)]
pub struct ListenCommand {
    /// Where to read presses from (overrides `source.kind`)
    #[arg(short, long, value_enum)]
    pub source: Option<SourceArg>,
}

/// The current subject's alert.
#[derive(Debug, Subcommand)]
pub enum AlertCommand {
    /// Send an emergency alert now
    Send {
        /// Alert message (defaults to `alert.manual_message`)
        #[arg(short, long)]
        message: Option<String>,

        /// Latitude of the current position
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,

        /// Longitude of the current position
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// End the open alert
    End,

    /// Show the open alert, if any
    Current {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Alerts across all subjects.
#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List open alerts
    Active {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Alert history commands.
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List alerts, newest first
    List {
        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Close an alert with a final message
    Terminate {
        /// Alert id
        id: String,

        /// Closing message
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Edit fields of an alert
    Edit(EditCommand),

    /// Delete an alert
    Delete {
        /// Alert id
        id: String,
    },
}

/// Fields to change on an alert. Omitted fields stay as they are.
#[derive(Debug, Args)]
pub struct EditCommand {
    /// Alert id
    pub id: String,

    /// New message
    #[arg(short, long)]
    pub message: Option<String>,

    /// New observation
    #[arg(short, long)]
    pub observation: Option<String>,

    /// New status
    #[arg(short, long, value_enum)]
    pub status: Option<AlertStatusArg>,

    /// New subject id
    #[arg(long)]
    pub subject: Option<String>,

    /// New group id
    #[arg(long)]
    pub group: Option<String>,

    /// New category id
    #[arg(long)]
    pub category: Option<String>,
}

impl EditCommand {
    /// The update this command describes.
    #[must_use]
    pub fn to_update(&self) -> AlertUpdate {
        AlertUpdate {
            subject_id: self.subject.clone(),
            group_id: self.group.clone(),
            category_id: self.category.clone(),
            message: self.message.clone(),
            observation: self.observation.clone(),
            status: self.status.map(AlertStatus::from),
        }
    }
}

/// Subject directory commands.
#[derive(Debug, Subcommand)]
pub enum SubjectCommand {
    /// Add or replace a subject
    Add {
        /// Subject id
        id: String,

        /// Given name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Family name
        #[arg(short, long, default_value = "")]
        last_name: String,

        /// Group id
        #[arg(short, long)]
        group: Option<String>,

        /// Role label
        #[arg(short, long, default_value = "")]
        role: String,
    },

    /// List subjects
    List {
        /// Only subjects in this group
        #[arg(short, long)]
        group: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Group directory commands.
#[derive(Debug, Subcommand)]
pub enum GroupCommand {
    /// Add or rename a group
    Add {
        /// Group id
        id: String,

        /// Display name
        name: String,
    },

    /// List groups
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Alert category commands.
#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Add a category
    Add {
        /// Display name, matched by `alert.category_name`
        name: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Display color
        #[arg(long, default_value = "")]
        color: String,

        /// Display icon
        #[arg(long, default_value = "")]
        icon: String,
    },

    /// List categories
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Press source argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Newline-delimited presses on standard input
    Stdin,
    /// Power button events from acpid (Linux)
    Acpi,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Stdin => Self::Stdin,
            SourceArg::Acpi => Self::Acpi,
        }
    }
}

/// Alert status argument for editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlertStatusArg {
    /// Open
    Active,
    /// Superseded by a newer alert
    Replaced,
    /// Closed
    Terminated,
}

impl From<AlertStatusArg> for AlertStatus {
    fn from(arg: AlertStatusArg) -> Self {
        match arg {
            AlertStatusArg::Active => Self::Active,
            AlertStatusArg::Replaced => Self::Replaced,
            AlertStatusArg::Terminated => Self::Terminated,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_arg_conversion() {
        assert_eq!(SourceKind::from(SourceArg::Stdin), SourceKind::Stdin);
        assert_eq!(SourceKind::from(SourceArg::Acpi), SourceKind::Acpi);
    }

    #[test]
    fn test_status_arg_conversion() {
        assert_eq!(
            AlertStatus::from(AlertStatusArg::Terminated),
            AlertStatus::Terminated
        );
        assert_eq!(AlertStatus::from(AlertStatusArg::Active), AlertStatus::Active);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_edit_to_update() {
        let cmd = EditCommand {
            id: "a1".to_string(),
            message: Some("checked".to_string()),
            observation: None,
            status: Some(AlertStatusArg::Replaced),
            subject: None,
            group: None,
            category: Some("c2".to_string()),
        };
        let update = cmd.to_update();
        assert_eq!(update.message.as_deref(), Some("checked"));
        assert_eq!(update.status, Some(AlertStatus::Replaced));
        assert_eq!(update.category_id.as_deref(), Some("c2"));
        assert!(update.subject_id.is_none());
    }

    #[test]
    fn test_empty_edit_is_empty_update() {
        let cmd = EditCommand {
            id: "a1".to_string(),
            message: None,
            observation: None,
            status: None,
            subject: None,
            group: None,
            category: None,
        };
        assert!(cmd.to_update().is_empty());
    }

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
