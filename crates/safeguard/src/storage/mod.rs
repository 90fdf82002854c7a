//! Storage layer for safeguard.
//!
//! This module provides `SQLite`-based persistent storage for alerts and the
//! records they refer to: subjects, groups and alert categories.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::alert::{Alert, AlertCategory, AlertStatus, AlertUpdate, GeoPoint, Group, Subject};
use crate::error::{Error, Result};

const ALERT_COLUMNS: &str = "id, active, subject_id, group_id, category_id, latitude, longitude, \
                             created_at, ended_at, message, status, observation";

/// Storage engine for alerts.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Alert insertion, termination, editing and deletion
/// - Replacing a subject's open alerts when a new one is raised
/// - Subject, group and category lookups
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!(path = %path.display(), "Opening alert database");
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!(path = %path.display(), "Alert database ready");
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- alerts ----

    /// Insert a new alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including when an
    /// alert with the same id already exists.
    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let (latitude, longitude) = match alert.location {
            Some(point) => (Some(point.latitude), Some(point.longitude)),
            None => (None, None),
        };

        self.conn.execute(
            r"
            INSERT INTO alerts (id, active, subject_id, group_id, category_id, latitude,
                                longitude, created_at, ended_at, message, status, observation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
            params![
                alert.id,
                alert.active,
                alert.subject_id,
                alert.group_id,
                alert.category_id,
                latitude,
                longitude,
                format_timestamp(alert.created_at),
                alert.ended_at.map(format_timestamp),
                alert.message,
                alert.status.to_string(),
                alert.observation,
            ],
        )?;

        debug!(id = %alert.id, subject = %alert.subject_id, "Inserted alert");
        Ok(())
    }

    /// Get an alert by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let alert = self
            .conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                [id],
                Self::row_to_alert,
            )
            .optional()?;
        Ok(alert)
    }

    /// List alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let alerts = stmt
            .query_map([limit_i64], Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// List open alerts across all subjects, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_active_alerts(&self) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE active = 1 AND status = 'active' \
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let alerts = stmt
            .query_map([], Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// Get the most recent alert raised by a subject, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_alert_for_subject(&self, subject_id: &str) -> Result<Option<Alert>> {
        let alert = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE subject_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                [subject_id],
                Self::row_to_alert,
            )
            .optional()?;
        Ok(alert)
    }

    /// Mark every open alert of a subject as replaced.
    ///
    /// Returns the number of alerts changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn replace_active_alerts(&self, subject_id: &str) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE alerts SET active = 0, status = 'replaced' WHERE subject_id = ?1 AND active = 1",
            [subject_id],
        )?;

        if affected > 0 {
            info!(subject = %subject_id, count = affected, "Replaced open alerts");
        }
        Ok(affected)
    }

    /// Replace the subject's open alerts and insert `alert` as one write.
    ///
    /// Returns the number of alerts replaced. If the insert fails the
    /// replaced alerts stay open.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn raise_alert(&self, alert: &Alert) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let replaced = self.replace_active_alerts(&alert.subject_id)?;
        self.insert_alert(alert)?;
        tx.commit()?;
        Ok(replaced)
    }

    /// Close an alert with a final message.
    ///
    /// Returns `true` if the alert existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn terminate_alert(&self, id: &str, message: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE alerts SET active = 0, status = 'terminated', message = ?2, ended_at = ?3 \
             WHERE id = ?1",
            params![id, message, format_timestamp(Utc::now())],
        )?;
        Ok(affected > 0)
    }

    /// Apply a partial update to an alert.
    ///
    /// Returns the updated alert, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_alert(&self, id: &str, update: &AlertUpdate) -> Result<Option<Alert>> {
        let Some(mut alert) = self.get_alert(id)? else {
            return Ok(None);
        };

        if let Some(subject_id) = &update.subject_id {
            alert.subject_id.clone_from(subject_id);
        }
        if let Some(group_id) = &update.group_id {
            alert.group_id.clone_from(group_id);
        }
        if let Some(category_id) = &update.category_id {
            alert.category_id.clone_from(category_id);
        }
        if let Some(message) = &update.message {
            alert.message.clone_from(message);
        }
        if let Some(observation) = &update.observation {
            alert.observation.clone_from(observation);
        }
        if let Some(status) = update.status {
            alert.status = status;
            match status {
                AlertStatus::Active => {
                    alert.active = true;
                    alert.ended_at = None;
                }
                AlertStatus::Terminated => {
                    alert.active = false;
                    if alert.ended_at.is_none() {
                        alert.ended_at = Some(Utc::now());
                    }
                }
                AlertStatus::Replaced => alert.active = false,
            }
        }

        let tx = self.conn.unchecked_transaction()?;

        // A subject has at most one open alert
        if alert.is_open() {
            self.conn.execute(
                "UPDATE alerts SET active = 0, status = 'replaced' \
                 WHERE subject_id = ?1 AND active = 1 AND id != ?2",
                params![alert.subject_id, alert.id],
            )?;
        }

        self.conn.execute(
            r"
            UPDATE alerts SET subject_id = ?2, group_id = ?3, category_id = ?4, message = ?5,
                              observation = ?6, status = ?7, active = ?8, ended_at = ?9
            WHERE id = ?1
            ",
            params![
                alert.id,
                alert.subject_id,
                alert.group_id,
                alert.category_id,
                alert.message,
                alert.observation,
                alert.status.to_string(),
                alert.active,
                alert.ended_at.map(format_timestamp),
            ],
        )?;
        tx.commit()?;

        debug!(id = %alert.id, status = %alert.status, "Updated alert");
        self.get_alert(id)
    }

    /// Delete an alert by id.
    ///
    /// Returns `true` if an alert was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_alert(&self, id: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM alerts WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    // ---- subjects ----

    /// Insert or replace a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO subjects (id, name, last_name, group_id, role) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                subject.id,
                subject.name,
                subject.last_name,
                subject.group_id,
                subject.role
            ],
        )?;
        Ok(())
    }

    /// Get a subject by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let subject = self
            .conn
            .query_row(
                "SELECT id, name, last_name, group_id, role FROM subjects WHERE id = ?1",
                [id],
                Self::row_to_subject,
            )
            .optional()?;
        Ok(subject)
    }

    /// List subjects, optionally only those in one group.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_subjects(&self, group_id: Option<&str>) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, last_name, group_id, role FROM subjects \
             WHERE ?1 IS NULL OR group_id = ?1 ORDER BY name, last_name",
        )?;

        let subjects = stmt
            .query_map([group_id], Self::row_to_subject)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    // ---- groups ----

    /// Insert or replace a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_group(&self, group: &Group) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO groups (id, name) VALUES (?1, ?2)",
            params![group.id, group.name],
        )?;
        Ok(())
    }

    /// Get a group by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let group = self
            .conn
            .query_row(
                "SELECT id, name FROM groups WHERE id = ?1",
                [id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    /// List all groups by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM groups ORDER BY name")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    // ---- categories ----

    /// Insert or replace an alert category.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_category(&self, category: &AlertCategory) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO alert_categories (id, name, description, color, icon, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.id,
                category.name,
                category.description,
                category.color,
                category.icon,
                format_timestamp(category.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a category by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_category(&self, id: &str) -> Result<Option<AlertCategory>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, description, color, icon, created_at \
                 FROM alert_categories WHERE id = ?1",
                [id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// Find a category by exact name. The oldest wins when names repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn category_by_name(&self, name: &str) -> Result<Option<AlertCategory>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, description, color, icon, created_at \
                 FROM alert_categories WHERE name = ?1 ORDER BY created_at ASC LIMIT 1",
                [name],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// List all categories by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_categories(&self) -> Result<Vec<AlertCategory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, color, icon, created_at \
             FROM alert_categories ORDER BY name",
        )?;
        let categories = stmt
            .query_map([], Self::row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Count total alerts in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_alerts(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_alerts = self.count_alerts()?;
        let active_alerts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE active = 1 AND status = 'active'",
            [],
            |row| row.get(0),
        )?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM alerts",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_alerts,
            active_alerts,
            oldest_alert: oldest.as_deref().and_then(parse_timestamp),
            newest_alert: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    /// Convert a database row to an Alert struct.
    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let latitude: Option<f64> = row.get(5)?;
        let longitude: Option<f64> = row.get(6)?;
        let created_at: String = row.get(7)?;
        let ended_at: Option<String> = row.get(8)?;
        let status_str: String = row.get(10)?;

        let status = AlertStatus::parse(&status_str).unwrap_or_else(|| {
            warn!(status = %status_str, "Unknown alert status, treating as active");
            AlertStatus::Active
        });

        Ok(Alert {
            id: row.get(0)?,
            active: row.get(1)?,
            subject_id: row.get(2)?,
            group_id: row.get(3)?,
            category_id: row.get(4)?,
            location: latitude
                .zip(longitude)
                .map(|(lat, lon)| GeoPoint::new(lat, lon)),
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
            ended_at: ended_at.as_deref().and_then(parse_timestamp),
            message: row.get(9)?,
            status,
            observation: row.get(11)?,
        })
    }

    fn row_to_subject(row: &rusqlite::Row) -> rusqlite::Result<Subject> {
        Ok(Subject {
            id: row.get(0)?,
            name: row.get(1)?,
            last_name: row.get(2)?,
            group_id: row.get(3)?,
            role: row.get(4)?,
        })
    }

    fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<AlertCategory> {
        let created_at: String = row.get(5)?;
        Ok(AlertCategory {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            color: row.get(3)?,
            icon: row.get(4)?,
            created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        })
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of alerts stored.
    pub total_alerts: i64,
    /// Alerts still open.
    pub active_alerts: i64,
    /// Creation time of the oldest alert.
    pub oldest_alert: Option<DateTime<Utc>>,
    /// Creation time of the newest alert.
    pub newest_alert: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
