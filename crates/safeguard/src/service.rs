//! Alert operations shared by the trigger action and the CLI.
//!
//! [`AlertService`] wraps the store behind `Arc<Mutex<_>>` so the listener's
//! trigger tasks and foreground commands can use one connection. Every method
//! is synchronous and holds the lock only for the duration of its `SQLite`
//! calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::alert::{
    Alert, AlertUpdate, GeoPoint, FALLBACK_CATEGORY_NAME, FALLBACK_GROUP_NAME,
    FALLBACK_SUBJECT_NAME,
};
use crate::error::{Error, Result};
use crate::storage::Storage;

/// Group label for a subject that has no group.
pub const NO_GROUP_NAME: &str = "No group";

/// Group label for a subject id that does not exist.
pub const UNKNOWN_SUBJECT_NAME: &str = "Unknown subject";

/// Everything needed to raise an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct RaiseRequest {
    /// Who the alert is for.
    pub subject_id: String,
    /// The subject's group.
    pub group_id: String,
    /// Alert category.
    pub category_id: String,
    /// Last known position, if any.
    pub location: Option<GeoPoint>,
    /// Alert message.
    pub message: String,
    /// Alert observation.
    pub observation: String,
}

/// Alert store operations.
#[derive(Debug, Clone)]
pub struct AlertService {
    storage: Arc<Mutex<Storage>>,
}

impl AlertService {
    /// Create a service that owns `storage`.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, Storage>> {
        self.storage
            .lock()
            .map_err(|_| Error::internal("alert store lock poisoned"))
    }

    /// Run a closure against the underlying store.
    ///
    /// # Errors
    ///
    /// Returns whatever the closure returns, or an internal error if the
    /// lock is poisoned.
    pub fn with_storage<T>(&self, f: impl FnOnce(&Storage) -> Result<T>) -> Result<T> {
        let store = self.store()?;
        f(&store)
    }

    /// Raise a new alert, replacing the subject's open ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write. The subject's
    /// previous alert is left open in that case.
    pub fn raise(&self, request: RaiseRequest) -> Result<Alert> {
        let alert = Alert::new(
            request.subject_id,
            request.group_id,
            request.category_id,
            request.location,
        )
        .with_message(request.message)
        .with_observation(request.observation);

        let replaced = self.store()?.raise_alert(&alert)?;

        info!(
            id = %alert.id,
            subject = %alert.subject_id,
            replaced,
            has_location = alert.location.is_some(),
            "Alert raised"
        );
        Ok(alert)
    }

    /// Raise an alert from the manual button.
    ///
    /// A position is required. The subject's group is used when known; no
    /// category is assigned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationUnavailable`] without a position, or a store
    /// error.
    pub fn send_manual_alert(
        &self,
        subject_id: &str,
        location: Option<GeoPoint>,
        message: &str,
    ) -> Result<Alert> {
        let location = location.ok_or(Error::LocationUnavailable)?;
        let group_id = self
            .with_storage(|s| s.get_subject(subject_id))?
            .and_then(|subject| subject.group_id)
            .unwrap_or_default();

        self.raise(RaiseRequest {
            subject_id: subject_id.to_string(),
            group_id,
            category_id: String::new(),
            location: Some(location),
            message: message.to_string(),
            observation: String::new(),
        })
    }

    /// The subject's latest alert, if it is still open.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn current_alert(&self, subject_id: &str) -> Result<Option<Alert>> {
        let latest = self.with_storage(|s| s.latest_alert_for_subject(subject_id))?;
        Ok(latest.filter(Alert::is_open))
    }

    /// Terminate the subject's open alert, keeping its message.
    ///
    /// Returns the terminated alert, or `None` when nothing was open.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update.
    pub fn end_current_alert(&self, subject_id: &str) -> Result<Option<Alert>> {
        let Some(current) = self.current_alert(subject_id)? else {
            debug!(subject = %subject_id, "No open alert to end");
            return Ok(None);
        };
        self.terminate(&current.id, &current.message).map(Some)
    }

    /// Open alerts of every subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn active_alerts(&self) -> Result<Vec<Alert>> {
        self.with_storage(Storage::list_active_alerts)
    }

    /// All alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn history(&self, limit: usize) -> Result<Vec<Alert>> {
        self.with_storage(|s| s.list_alerts(limit))
    }

    /// Close an alert with a final message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlertNotFound`] for an unknown id, or a store error.
    pub fn terminate(&self, id: &str, message: &str) -> Result<Alert> {
        let alert = self.with_storage(|s| {
            if !s.terminate_alert(id, message)? {
                return Err(Error::alert_not_found(id));
            }
            s.get_alert(id)?.ok_or_else(|| Error::alert_not_found(id))
        })?;
        info!(id = %alert.id, "Alert terminated");
        Ok(alert)
    }

    /// Edit an alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlertNotFound`] for an unknown id, or a store error.
    pub fn update(&self, id: &str, update: &AlertUpdate) -> Result<Alert> {
        self.with_storage(|s| s.update_alert(id, update))?
            .ok_or_else(|| Error::alert_not_found(id))
    }

    /// Delete an alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlertNotFound`] for an unknown id, or a store error.
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.with_storage(|s| s.delete_alert(id))? {
            info!(id = %id, "Alert deleted");
            Ok(())
        } else {
            Err(Error::alert_not_found(id))
        }
    }

    // ---- display names ----

    /// Display name of a subject, `User` when unknown or unnamed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn subject_name(&self, subject_id: &str) -> Result<String> {
        Ok(self
            .with_storage(|s| s.get_subject(subject_id))?
            .map_or_else(|| FALLBACK_SUBJECT_NAME.to_string(), |s| s.display_name()))
    }

    /// Name of a group, `Group` when unknown or unnamed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn group_name(&self, group_id: &str) -> Result<String> {
        Ok(self
            .with_storage(|s| s.get_group(group_id))?
            .map(|g| g.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_GROUP_NAME.to_string()))
    }

    /// Name of a category, `Alert type` when unknown or unnamed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn category_name(&self, category_id: &str) -> Result<String> {
        Ok(self
            .with_storage(|s| s.get_category(category_id))?
            .map(|c| c.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_CATEGORY_NAME.to_string()))
    }

    /// Name of the group a subject belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn subject_group_name(&self, subject_id: &str) -> Result<String> {
        let Some(subject) = self.with_storage(|s| s.get_subject(subject_id))? else {
            return Ok(UNKNOWN_SUBJECT_NAME.to_string());
        };
        match subject.group_id {
            Some(group_id) if !group_id.is_empty() => self.group_name(&group_id),
            _ => Ok(NO_GROUP_NAME.to_string()),
        }
    }

    /// Display names for many subjects at once.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn subject_names<'a, I>(&self, ids: I) -> Result<HashMap<String, String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .map(|id| Ok((id.to_string(), self.subject_name(id)?)))
            .collect()
    }

    /// Names for many groups at once.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn group_names<'a, I>(&self, ids: I) -> Result<HashMap<String, String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .map(|id| Ok((id.to_string(), self.group_name(id)?)))
            .collect()
    }

    /// Names for many categories at once.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn category_names<'a, I>(&self, ids: I) -> Result<HashMap<String, String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .map(|id| Ok((id.to_string(), self.category_name(id)?)))
            .collect()
    }
}
