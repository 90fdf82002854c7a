//! `SQLite` schema definitions for safeguard.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the alerts table.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    active INTEGER NOT NULL,
    subject_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    category_id TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    created_at TEXT NOT NULL,
    ended_at TEXT,
    message TEXT NOT NULL,
    status TEXT NOT NULL,
    observation TEXT NOT NULL
)
";

/// SQL statement to create an index on `created_at` for history queries.
pub const CREATE_CREATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at DESC)
";

/// SQL statement to create an index for a subject's open alerts.
pub const CREATE_SUBJECT_ACTIVE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_subject_active ON alerts(subject_id, active)
";

/// SQL statement to create the subjects table.
pub const CREATE_SUBJECTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS subjects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    group_id TEXT,
    role TEXT NOT NULL
)
";

/// SQL statement to create the groups table.
pub const CREATE_GROUPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
)
";

/// SQL statement to create the alert categories table.
pub const CREATE_CATEGORIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alert_categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    color TEXT NOT NULL,
    icon TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on category names for lookups by name.
pub const CREATE_CATEGORY_NAME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alert_categories_name ON alert_categories(name)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ALERTS_TABLE,
    CREATE_CREATED_AT_INDEX,
    CREATE_SUBJECT_ACTIVE_INDEX,
    CREATE_SUBJECTS_TABLE,
    CREATE_GROUPS_TABLE,
    CREATE_CATEGORIES_TABLE,
    CREATE_CATEGORY_NAME_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_alerts_table_contains_required_columns() {
        assert!(CREATE_ALERTS_TABLE.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_ALERTS_TABLE.contains("active INTEGER NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("subject_id TEXT NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("status TEXT NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("latitude REAL"));
    }
}
