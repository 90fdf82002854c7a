//! Error types for safeguard.
//!
//! This module defines all error types used throughout the safeguard crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for safeguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Press Source Errors ===
    /// A press source failed to start.
    #[error("failed to start press source '{name}': {message}")]
    SourceStart {
        /// Name of the press source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// A press source is already running.
    #[error("press source '{name}' is already running")]
    SourceAlreadyRunning {
        /// Name of the press source.
        name: &'static str,
    },

    // === Alert Errors ===
    /// No alert exists with the given id.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The alert id that was looked up.
        id: String,
    },

    /// No subject is configured as the current identity.
    #[error("no subject is signed in; set identity.subject_id")]
    NotAuthenticated,

    /// The subject could not be resolved to a group.
    #[error("subject '{subject_id}' has no group assignment")]
    GroupUnresolved {
        /// The subject that was looked up.
        subject_id: String,
    },

    /// The configured alert category does not exist.
    #[error("alert category '{name}' does not exist")]
    CategoryUnresolved {
        /// The category name that was looked up.
        name: String,
    },

    /// No location fix was available.
    #[error("location unavailable")]
    LocationUnavailable,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for safeguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a press source start error.
    #[must_use]
    pub fn source_start(name: &'static str, message: impl Into<String>) -> Self {
        Self::SourceStart {
            name,
            message: message.into(),
        }
    }

    /// Create an alert-not-found error.
    #[must_use]
    pub fn alert_not_found(id: impl Into<String>) -> Self {
        Self::AlertNotFound { id: id.into() }
    }

    /// Check if this error means a lookup came back empty.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AlertNotFound { .. })
    }

    /// Check if this error comes from missing identity, group or category data.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::GroupUnresolved { .. } | Self::CategoryUnresolved { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::LocationUnavailable;
        assert_eq!(err.to_string(), "location unavailable");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_alert_not_found() {
        let err = Error::alert_not_found("abc-123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("abc-123"));
        assert!(!Error::LocationUnavailable.is_not_found());
    }

    #[test]
    fn test_is_unresolved() {
        assert!(Error::NotAuthenticated.is_unresolved());
        assert!(Error::GroupUnresolved {
            subject_id: "u1".to_string()
        }
        .is_unresolved());
        assert!(Error::CategoryUnresolved {
            name: "CRITICAL ALERT".to_string()
        }
        .is_unresolved());
        assert!(!Error::LocationUnavailable.is_unresolved());
    }

    #[test]
    fn test_source_start_error() {
        let err = Error::source_start("acpi", "socket missing");
        let msg = err.to_string();
        assert!(msg.contains("acpi"));
        assert!(msg.contains("socket missing"));
    }

    #[test]
    fn test_source_already_running_display() {
        let err = Error::SourceAlreadyRunning { name: "stdin" };
        assert_eq!(err.to_string(), "press source 'stdin' is already running");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "max_gap_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("max_gap_ms"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout {
            operation: "trigger action".to_string(),
        };
        assert!(err.to_string().contains("trigger action"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
