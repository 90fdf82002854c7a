//! Last-known location lookup.
//!
//! Alerts carry the subject's position when one is available. Lookups are
//! best effort: a provider with no fix returns `Ok(None)` and the alert is
//! written without coordinates.

use tracing::trace;

use crate::alert::GeoPoint;
use crate::error::Result;

/// A source of the device's last known position.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    /// The name of this provider (for logging/debugging).
    fn name(&self) -> &'static str;

    /// The most recent fix, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider itself failed. Having no fix is not
    /// an error.
    async fn last_known(&self) -> Result<Option<GeoPoint>>;
}

/// A provider that always reports the same point, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    point: GeoPoint,
}

impl FixedLocation {
    /// Create a provider for a fixed point.
    #[must_use]
    pub fn new(point: GeoPoint) -> Self {
        Self { point }
    }
}

#[async_trait::async_trait]
impl LocationProvider for FixedLocation {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn last_known(&self) -> Result<Option<GeoPoint>> {
        trace!(point = %self.point, "Using fixed location");
        Ok(Some(self.point))
    }
}

/// A provider with no positioning at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait::async_trait]
impl LocationProvider for NoLocation {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn last_known(&self) -> Result<Option<GeoPoint>> {
        Ok(None)
    }
}

/// Pick a provider from configuration: a fixed point when one is set,
/// otherwise none.
#[must_use]
pub fn from_config(config: &crate::Config) -> Box<dyn LocationProvider> {
    match config.fixed_location() {
        Some(point) => Box::new(FixedLocation::new(point)),
        None => Box::new(NoLocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[tokio::test]
    async fn test_fixed_location() {
        let provider = FixedLocation::new(GeoPoint::new(4.6, -74.08));
        assert_eq!(provider.name(), "fixed");
        assert_eq!(
            provider.last_known().await.unwrap(),
            Some(GeoPoint::new(4.6, -74.08))
        );
    }

    #[tokio::test]
    async fn test_no_location() {
        let provider = NoLocation;
        assert!(provider.last_known().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_config() {
        let mut config = Config::default();
        assert_eq!(from_config(&config).name(), "none");

        config.location.latitude = Some(1.0);
        config.location.longitude = Some(2.0);
        let provider = from_config(&config);
        assert_eq!(provider.name(), "fixed");
        assert_eq!(
            provider.last_known().await.unwrap(),
            Some(GeoPoint::new(1.0, 2.0))
        );
    }
}
