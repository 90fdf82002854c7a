//! Core alert types for safeguard.
//!
//! This module defines the records the alert store keeps: alerts themselves,
//! the categories they are filed under, and the subjects and groups they
//! belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used when a subject has no usable name.
pub const FALLBACK_SUBJECT_NAME: &str = "User";

/// Display name used when a group cannot be resolved.
pub const FALLBACK_GROUP_NAME: &str = "Group";

/// Display name used when an alert category cannot be resolved.
pub const FALLBACK_CATEGORY_NAME: &str = "Alert type";

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// The alert is open.
    #[default]
    Active,
    /// A newer alert from the same subject superseded this one.
    Replaced,
    /// Someone closed the alert.
    Terminated,
}

impl AlertStatus {
    /// Parse a stored status string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "replaced" => Some(Self::Replaced),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Replaced => write!(f, "replaced"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A persisted emergency alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Whether the alert is still open.
    pub active: bool,

    /// The subject who raised the alert.
    pub subject_id: String,

    /// The subject's group at the time the alert was raised.
    pub group_id: String,

    /// The alert category.
    pub category_id: String,

    /// Where the subject was, if a fix was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,

    /// When the alert was raised.
    pub created_at: DateTime<Utc>,

    /// When the alert was terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Free-form message.
    pub message: String,

    /// Lifecycle status.
    pub status: AlertStatus,

    /// Free-form observation.
    pub observation: String,
}

impl Alert {
    /// Create a new open alert with a fresh id, stamped now.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        group_id: impl Into<String>,
        category_id: impl Into<String>,
        location: Option<GeoPoint>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            active: true,
            subject_id: subject_id.into(),
            group_id: group_id.into(),
            category_id: category_id.into(),
            location,
            created_at: Utc::now(),
            ended_at: None,
            message: String::new(),
            status: AlertStatus::Active,
            observation: String::new(),
        }
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the observation.
    #[must_use]
    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = observation.into();
        self
    }

    /// Whether the alert is open and has not been replaced or terminated.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active && self.status == AlertStatus::Active
    }
}

/// A partial update to an alert. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertUpdate {
    /// New subject.
    pub subject_id: Option<String>,
    /// New group.
    pub group_id: Option<String>,
    /// New category.
    pub category_id: Option<String>,
    /// New message.
    pub message: Option<String>,
    /// New observation.
    pub observation: Option<String>,
    /// New status. Any status other than `active` also clears `active`.
    pub status: Option<AlertStatus>,
}

impl AlertUpdate {
    /// Check if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A kind of alert, looked up by name when alerts are raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCategory {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Display color.
    pub color: String,
    /// Display icon.
    pub icon: String,
    /// When the category was created.
    pub created_at: DateTime<Utc>,
}

impl AlertCategory {
    /// Create a category with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            color: String::new(),
            icon: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// A person alerts are raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier.
    pub id: String,
    /// Given name.
    pub name: String,
    /// Family name.
    pub last_name: String,
    /// Group the subject belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Role label.
    pub role: String,
}

impl Subject {
    /// The name shown to other group members.
    ///
    /// Uses `name last_name` when both are set, `name` alone when only it is,
    /// and a generic label otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.name, self.last_name),
            (false, true) => self.name.clone(),
            _ => FALLBACK_SUBJECT_NAME.to_string(),
        }
    }
}

/// A group of subjects that watch each other's alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}
