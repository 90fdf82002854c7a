//! Power button press pattern detection.
//!
//! The detector turns a stream of screen on/off ticks into a single
//! "emergency gesture" signal: `required_presses` ticks where no two
//! consecutive ticks are further apart than `max_gap`. It is a plain state
//! machine with no I/O; [`crate::listener`] owns an instance and drives the
//! trigger action from its outcomes.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use safeguard::detector::{PressOutcome, PressPattern, PressPatternDetector};
//! use tokio::time::Instant;
//!
//! let mut detector = PressPatternDetector::new(PressPattern::default());
//! let start = Instant::now();
//!
//! let mut fired = false;
//! for i in 0..5 {
//!     let outcome = detector.on_press(start + Duration::from_millis(200 * i));
//!     fired = outcome == PressOutcome::Trigger;
//! }
//! assert!(fired);
//! assert!(detector.is_processing());
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// The gesture the detector looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressPattern {
    /// Number of presses that make up a gesture.
    pub required_presses: usize,
    /// Largest allowed spacing between consecutive presses (inclusive).
    pub max_gap: Duration,
}

impl Default for PressPattern {
    fn default() -> Self {
        Self {
            required_presses: 5,
            max_gap: Duration::from_millis(1000),
        }
    }
}

impl PressPattern {
    /// Build a pattern from the detector section of the configuration.
    #[must_use]
    pub fn from_config(config: &crate::Config) -> Self {
        Self {
            required_presses: config.detector.required_presses,
            max_gap: config.max_gap(),
        }
    }
}

/// What the detector decided after a press or a trigger completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The press was added to the current run, which is not complete yet.
    Recorded {
        /// Presses in the current run.
        count: usize,
        /// The previous run went cold and was discarded first.
        restarted: bool,
    },
    /// The run is complete but a trigger is already in flight.
    Pending,
    /// A gesture was validated: start the trigger action now.
    Trigger,
    /// The completed run failed full-window validation and was discarded.
    Invalidated,
    /// Nothing to do.
    Idle,
}

/// Accumulated presses and the in-flight guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressSequence {
    timestamps: Vec<Instant>,
    processing: bool,
}

impl PressSequence {
    /// Number of presses in the current run.
    #[must_use]
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    /// Press instants of the current run, oldest first.
    #[must_use]
    pub fn timestamps(&self) -> &[Instant] {
        &self.timestamps
    }

    /// Whether a trigger action is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// Detects the emergency press gesture.
///
/// The detector is single-owner: it is mutated only by whoever feeds it
/// presses and completions, and is not meant to be shared across threads.
#[derive(Debug, Clone)]
pub struct PressPatternDetector {
    pattern: PressPattern,
    sequence: PressSequence,
}

impl PressPatternDetector {
    /// Create a detector for the given pattern.
    ///
    /// A pattern of zero presses is raised to one.
    #[must_use]
    pub fn new(pattern: PressPattern) -> Self {
        let pattern = if pattern.required_presses == 0 {
            warn!("required_presses is 0, using 1");
            PressPattern {
                required_presses: 1,
                ..pattern
            }
        } else {
            pattern
        };
        Self {
            pattern,
            sequence: PressSequence {
                timestamps: Vec::with_capacity(pattern.required_presses),
                processing: false,
            },
        }
    }

    /// The pattern this detector matches.
    #[must_use]
    pub fn pattern(&self) -> PressPattern {
        self.pattern
    }

    /// Current press sequence.
    #[must_use]
    pub fn sequence(&self) -> &PressSequence {
        &self.sequence
    }

    /// Number of presses in the current run.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sequence.count()
    }

    /// Whether a trigger action is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.sequence.processing
    }

    /// Instant of the most recent press in the current run.
    #[must_use]
    pub fn last_press(&self) -> Option<Instant> {
        self.sequence.timestamps.last().copied()
    }

    /// Feed one press observed at `at`.
    ///
    /// Screen-on and screen-off ticks are both presses. A press arriving more
    /// than `max_gap` after the previous one starts a new run. Once the run
    /// holds `required_presses` presses, further presses are dropped until the
    /// run is consumed.
    pub fn on_press(&mut self, at: Instant) -> PressOutcome {
        let mut restarted = false;

        if let Some(last) = self.last_press() {
            let gap = at.saturating_duration_since(last);
            if gap > self.pattern.max_gap {
                debug!(
                    gap_ms = gap.as_millis(),
                    discarded = self.count(),
                    "Press gap exceeded, restarting run"
                );
                self.sequence.clear();
                restarted = true;
            }
        }

        if self.count() < self.pattern.required_presses {
            self.sequence.timestamps.push(at);
            debug!(
                count = self.count(),
                required = self.pattern.required_presses,
                "Press registered"
            );
        } else {
            trace!("Run already complete, press dropped");
        }

        match self.evaluate() {
            PressOutcome::Idle => PressOutcome::Recorded {
                count: self.count(),
                restarted,
            },
            outcome => outcome,
        }
    }

    /// Mark the in-flight trigger action as finished, whatever its outcome.
    ///
    /// If another full run accumulated while the action was running, it is
    /// evaluated right away and may return [`PressOutcome::Trigger`] again.
    pub fn finish_trigger(&mut self) -> PressOutcome {
        if !self.sequence.processing {
            trace!("No trigger in flight");
        }
        self.sequence.processing = false;
        debug!(pending = self.count(), "Trigger finished, detector available");
        self.evaluate()
    }

    /// Discard the current run. An in-flight trigger is not affected.
    pub fn reset(&mut self) {
        self.sequence.clear();
    }

    /// Check a full run and fire or discard it.
    fn evaluate(&mut self) -> PressOutcome {
        if self.count() < self.pattern.required_presses {
            return PressOutcome::Idle;
        }
        if self.sequence.processing {
            trace!("Run complete, waiting for in-flight trigger");
            return PressOutcome::Pending;
        }

        if self.window_is_valid() {
            debug!("Valid press sequence detected");
            self.sequence.processing = true;
            // Presses made while the action runs go into a fresh run
            self.sequence.clear();
            PressOutcome::Trigger
        } else {
            debug!("Invalid press sequence, discarding run");
            self.sequence.clear();
            PressOutcome::Invalidated
        }
    }

    /// Re-check every adjacent pair in the run against `max_gap`.
    fn window_is_valid(&self) -> bool {
        self.sequence
            .timestamps
            .windows(2)
            .all(|pair| pair[1].saturating_duration_since(pair[0]) <= self.pattern.max_gap)
    }

    #[cfg(test)]
    fn force_run(&mut self, timestamps: Vec<Instant>) {
        self.sequence.timestamps = timestamps;
    }
}
