//! What happens when the gesture is detected.
//!
//! The listener calls [`TriggerAction::fire`] once per validated gesture.
//! [`EmergencyAlert`] is the production action: it resolves who is asking
//! for help, writes the alert and confirms with a haptic pulse.

use std::time::Duration;

use tracing::{debug, warn};

use crate::alert::Alert;
use crate::error::{Error, Result};
use crate::haptics::Haptics;
use crate::location::LocationProvider;
use crate::service::{AlertService, RaiseRequest};
use crate::Config;

/// An asynchronous side effect run once per validated gesture.
///
/// Failures are reported to the caller, which logs and drops them.
#[async_trait::async_trait]
pub trait TriggerAction: Send + Sync {
    /// The name of this action (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Run the action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not complete.
    async fn fire(&self) -> Result<()>;
}

/// Settings for [`EmergencyAlert`], usually taken from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencySettings {
    /// Subject alerts are raised for. `None` means nobody is signed in.
    pub subject_id: Option<String>,
    /// Name of the category to file alerts under.
    pub category_name: String,
    /// Alert message.
    pub message: String,
    /// Alert observation.
    pub observation: String,
    /// Length of the confirmation pulse.
    pub pulse: Duration,
}

impl EmergencySettings {
    /// Build settings from the identity and alert sections.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            subject_id: config.identity.subject_id.clone(),
            category_name: config.alert.category_name.clone(),
            message: config.alert.trigger_message.clone(),
            observation: config.alert.trigger_observation.clone(),
            pulse: config.haptic_pulse(),
        }
    }
}

/// Raises an emergency alert for the configured subject.
pub struct EmergencyAlert {
    service: AlertService,
    location: Box<dyn LocationProvider>,
    haptics: Box<dyn Haptics>,
    settings: EmergencySettings,
}

impl std::fmt::Debug for EmergencyAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyAlert")
            .field("location", &self.location.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EmergencyAlert {
    /// Create the action.
    #[must_use]
    pub fn new(
        service: AlertService,
        location: Box<dyn LocationProvider>,
        haptics: Box<dyn Haptics>,
        settings: EmergencySettings,
    ) -> Self {
        Self {
            service,
            location,
            haptics,
            settings,
        }
    }

    /// Resolve everything and write the alert, without the pulse.
    ///
    /// The location lookup is best effort. The subject, their group and the
    /// category must all resolve.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`], [`Error::GroupUnresolved`] or
    /// [`Error::CategoryUnresolved`] when a lookup fails, or a store error.
    pub async fn send(&self) -> Result<Alert> {
        let location = match self.location.last_known().await {
            Ok(point) => point,
            Err(e) => {
                warn!(error = %e, "Location lookup failed, sending alert without it");
                None
            }
        };

        let subject_id = self
            .settings
            .subject_id
            .as_deref()
            .ok_or(Error::NotAuthenticated)?;

        let group_id = self
            .service
            .with_storage(|s| s.get_subject(subject_id))?
            .and_then(|subject| subject.group_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::GroupUnresolved {
                subject_id: subject_id.to_string(),
            })?;

        let category = self
            .service
            .with_storage(|s| s.category_by_name(&self.settings.category_name))?
            .ok_or_else(|| Error::CategoryUnresolved {
                name: self.settings.category_name.clone(),
            })?;

        debug!(
            subject = %subject_id,
            group = %group_id,
            category = %category.id,
            "Resolved alert recipients"
        );

        self.service.raise(RaiseRequest {
            subject_id: subject_id.to_string(),
            group_id,
            category_id: category.id,
            location,
            message: self.settings.message.clone(),
            observation: self.settings.observation.clone(),
        })
    }
}

#[async_trait::async_trait]
impl TriggerAction for EmergencyAlert {
    fn name(&self) -> &'static str {
        "emergency_alert"
    }

    async fn fire(&self) -> Result<()> {
        let result = self.send().await;
        self.haptics.pulse(self.settings.pulse);
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertCategory, AlertStatus, GeoPoint, Group, Subject};
    use crate::haptics::RecordingHaptics;
    use crate::location::{FixedLocation, NoLocation};
    use crate::storage::Storage;

    struct BrokenLocation;

    #[async_trait::async_trait]
    impl LocationProvider for BrokenLocation {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn last_known(&self) -> Result<Option<GeoPoint>> {
            Err(Error::internal("gps offline"))
        }
    }

    fn seeded_service() -> (AlertService, AlertCategory) {
        let service = AlertService::new(Storage::open_in_memory().unwrap());
        let category = AlertCategory::new("CRITICAL ALERT");
        service
            .with_storage(|s| {
                s.upsert_group(&Group {
                    id: "g1".to_string(),
                    name: "Night shift".to_string(),
                })?;
                s.upsert_subject(&Subject {
                    id: "s1".to_string(),
                    name: "Ana".to_string(),
                    last_name: "Ruiz".to_string(),
                    group_id: Some("g1".to_string()),
                    role: "guard".to_string(),
                })?;
                s.upsert_subject(&Subject {
                    id: "loner".to_string(),
                    name: "Luis".to_string(),
                    last_name: String::new(),
                    group_id: None,
                    role: String::new(),
                })?;
                s.upsert_category(&category)
            })
            .unwrap();
        (service, category)
    }

    fn settings(subject: Option<&str>) -> EmergencySettings {
        EmergencySettings {
            subject_id: subject.map(str::to_string),
            ..EmergencySettings::from_config(&Config::default())
        }
    }

    fn build_action(
        service: &AlertService,
        location: Box<dyn LocationProvider>,
        subject: Option<&str>,
    ) -> (EmergencyAlert, RecordingHaptics) {
        let haptics = RecordingHaptics::default();
        let action = EmergencyAlert::new(
            service.clone(),
            location,
            Box::new(haptics.clone()),
            settings(subject),
        );
        (action, haptics)
    }

    #[tokio::test]
    async fn test_fire_writes_alert() {
        let (service, category) = seeded_service();
        let (action, haptics) = build_action(
            &service,
            Box::new(FixedLocation::new(GeoPoint::new(4.6, -74.08))),
            Some("s1"),
        );

        action.fire().await.unwrap();

        let active = service.active_alerts().unwrap();
        assert_eq!(active.len(), 1);
        let alert = &active[0];
        assert_eq!(alert.subject_id, "s1");
        assert_eq!(alert.group_id, "g1");
        assert_eq!(alert.category_id, category.id);
        assert_eq!(alert.location, Some(GeoPoint::new(4.6, -74.08)));
        assert_eq!(alert.message, "");
        assert_eq!(alert.observation, "alert sent from power button");
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(haptics.pulses(), vec![Duration::from_millis(1200)]);
    }

    #[tokio::test]
    async fn test_fire_replaces_previous_alert() {
        let (service, _) = seeded_service();
        let (action, _) = build_action(&service, Box::new(NoLocation), Some("s1"));

        action.fire().await.unwrap();
        action.fire().await.unwrap();

        let history = service.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.iter().filter(|a| a.is_open()).count(),
            1,
            "only the newest alert stays open"
        );
        assert!(history
            .iter()
            .any(|a| a.status == AlertStatus::Replaced && !a.active));
    }

    #[tokio::test]
    async fn test_fire_without_location() {
        let (service, _) = seeded_service();
        let (action, _) = build_action(&service, Box::new(BrokenLocation), Some("s1"));

        action.fire().await.unwrap();
        assert!(service.active_alerts().unwrap()[0].location.is_none());
    }

    #[tokio::test]
    async fn test_fire_not_authenticated_still_pulses() {
        let (service, _) = seeded_service();
        let (action, haptics) = build_action(&service, Box::new(NoLocation), None);

        let err = action.fire().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
        assert_eq!(haptics.pulses().len(), 1);
        assert!(service.history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fire_group_unresolved() {
        let (service, _) = seeded_service();
        let (action, haptics) = build_action(&service, Box::new(NoLocation), Some("loner"));

        let err = action.fire().await.unwrap_err();
        assert!(matches!(err, Error::GroupUnresolved { ref subject_id } if subject_id == "loner"));
        assert_eq!(haptics.pulses().len(), 1);

        let (action, _) = build_action(&service, Box::new(NoLocation), Some("nobody"));
        assert!(action.fire().await.unwrap_err().is_unresolved());
    }

    #[tokio::test]
    async fn test_fire_category_unresolved() {
        let (service, _) = seeded_service();
        let haptics = RecordingHaptics::default();
        let action = EmergencyAlert::new(
            service.clone(),
            Box::new(NoLocation),
            Box::new(haptics.clone()),
            EmergencySettings {
                category_name: "Does not exist".to_string(),
                ..settings(Some("s1"))
            },
        );

        let err = action.fire().await.unwrap_err();
        assert!(matches!(err, Error::CategoryUnresolved { .. }));
        assert_eq!(haptics.pulses().len(), 1);
        assert!(service.history(10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.identity.subject_id = Some("s1".to_string());
        config.alert.haptic_pulse_ms = 300;

        let settings = EmergencySettings::from_config(&config);
        assert_eq!(settings.subject_id.as_deref(), Some("s1"));
        assert_eq!(settings.category_name, "CRITICAL ALERT");
        assert_eq!(settings.pulse, Duration::from_millis(300));
    }

    #[test]
    fn test_debug_output() {
        let (service, _) = seeded_service();
        let (action, _) = build_action(&service, Box::new(NoLocation), Some("s1"));
        let debug = format!("{action:?}");
        assert!(debug.contains("EmergencyAlert"));
        assert!(debug.contains("none"));
    }
}
