//! Confirmation pulse after a trigger.
//!
//! The subject gets one pulse per trigger whether or not the alert was
//! written, so the gesture always feels acknowledged.

use std::time::Duration;

use tracing::info;

/// Something that can give the subject physical feedback.
pub trait Haptics: Send + Sync {
    /// Produce a pulse of the given length.
    fn pulse(&self, duration: Duration);
}

/// Reports pulses through the log. Used where no vibration motor exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self, duration: Duration) {
        info!(duration_ms = duration.as_millis(), "Confirmation pulse");
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingHaptics;

#[cfg(test)]
mod recording {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::Haptics;

    /// Remembers every pulse so tests can count them.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingHaptics {
        pulses: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingHaptics {
        pub(crate) fn pulses(&self) -> Vec<Duration> {
            self.pulses.lock().unwrap().clone()
        }
    }

    impl Haptics for RecordingHaptics {
        fn pulse(&self, duration: Duration) {
            self.pulses.lock().unwrap().push(duration);
        }
    }
}
