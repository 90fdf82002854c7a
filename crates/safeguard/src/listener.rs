//! The press listener task.
//!
//! A [`PressListener`] owns the detector inside a single tokio task. It reads
//! [`PressEvent`]s from a channel, spawns the trigger action for every
//! validated gesture and feeds the action's completion back into the
//! detector. The returned [`ListenerHandle`] stops the task and reports
//! counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::detector::{PressOutcome, PressPattern, PressPatternDetector};
use crate::error::{Error, Result};
use crate::source::PressEvent;
use crate::trigger::TriggerAction;
use crate::Config;

/// Counters reported by a running listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStatus {
    /// Presses received.
    pub presses_seen: u64,
    /// Trigger actions started.
    pub triggers_fired: u64,
    /// Trigger actions that failed or timed out.
    pub trigger_failures: u64,
    /// Whether a trigger action is running right now.
    pub in_flight: bool,
}

#[derive(Debug, Default)]
struct Counters {
    presses_seen: AtomicU64,
    triggers_fired: AtomicU64,
    trigger_failures: AtomicU64,
    in_flight: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> ListenerStatus {
        ListenerStatus {
            presses_seen: self.presses_seen.load(Ordering::SeqCst),
            triggers_fired: self.triggers_fired.load(Ordering::SeqCst),
            trigger_failures: self.trigger_failures.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Stops a listener and reads its counters. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ListenerControl {
    counters: Arc<Counters>,
    stop_signal: Arc<Notify>,
}

impl ListenerControl {
    /// Tear the listener down. A running trigger action is left to finish
    /// on its own; its result is discarded.
    pub fn stop(&self) {
        debug!("Stopping press listener");
        self.stop_signal.notify_one();
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> ListenerStatus {
        self.counters.snapshot()
    }
}

/// Handle to a spawned listener task.
#[derive(Debug)]
pub struct ListenerHandle {
    control: ListenerControl,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Tear the listener down.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> ListenerStatus {
        self.control.status()
    }

    /// A cloneable control for use from other tasks.
    #[must_use]
    pub fn control(&self) -> ListenerControl {
        self.control.clone()
    }

    /// Wait for the listener task to exit and return the final counters.
    ///
    /// The task exits after [`stop`](Self::stop), or once the event channel
    /// closes and no trigger action is left running.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the task panicked.
    pub async fn join(self) -> Result<ListenerStatus> {
        self.task
            .await
            .map_err(|e| Error::internal(format!("press listener task failed: {e}")))?;
        Ok(self.control.status())
    }
}

/// Drives a [`PressPatternDetector`] from a stream of press events.
pub struct PressListener {
    detector: PressPatternDetector,
    action: Arc<dyn TriggerAction>,
    trigger_timeout: Option<Duration>,
}

impl std::fmt::Debug for PressListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PressListener")
            .field("detector", &self.detector)
            .field("action", &self.action.name())
            .field("trigger_timeout", &self.trigger_timeout)
            .finish()
    }
}

impl PressListener {
    /// Create a listener for `pattern` that runs `action` on every gesture.
    #[must_use]
    pub fn new(pattern: PressPattern, action: Arc<dyn TriggerAction>) -> Self {
        Self {
            detector: PressPatternDetector::new(pattern),
            action,
            trigger_timeout: None,
        }
    }

    /// Create a listener from the detector section of the configuration.
    #[must_use]
    pub fn from_config(config: &Config, action: Arc<dyn TriggerAction>) -> Self {
        Self::new(PressPattern::from_config(config), action)
            .with_trigger_timeout(config.trigger_timeout())
    }

    /// Bound how long a trigger action may run. `None` means no bound.
    #[must_use]
    pub fn with_trigger_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.trigger_timeout = timeout;
        self
    }

    /// Start the listener task.
    #[must_use]
    pub fn spawn(self, events: mpsc::Receiver<PressEvent>) -> ListenerHandle {
        let control = ListenerControl {
            counters: Arc::new(Counters::default()),
            stop_signal: Arc::new(Notify::new()),
        };
        let task = tokio::spawn(self.run(events, control.clone()));
        ListenerHandle { control, task }
    }

    async fn run(mut self, mut events: mpsc::Receiver<PressEvent>, control: ListenerControl) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<bool>();
        let counters = &control.counters;
        let mut events_open = true;

        info!(
            required = self.detector.pattern().required_presses,
            max_gap_ms = self.detector.pattern().max_gap.as_millis(),
            "Listening for power button presses"
        );

        loop {
            tokio::select! {
                biased;

                () = control.stop_signal.notified() => {
                    debug!("Press listener stopped");
                    break;
                }

                Some(succeeded) = done_rx.recv() => {
                    if !succeeded {
                        counters.trigger_failures.fetch_add(1, Ordering::SeqCst);
                    }
                    counters.in_flight.store(false, Ordering::SeqCst);
                    if self.detector.finish_trigger() == PressOutcome::Trigger {
                        info!("Queued gesture validated");
                        self.launch(&done_tx, counters);
                    } else if !events_open {
                        debug!("Press stream ended and no trigger running");
                        break;
                    }
                }

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        counters.presses_seen.fetch_add(1, Ordering::SeqCst);
                        trace!(kind = %event.kind, "Press received");
                        let outcome = self.detector.on_press(event.at);
                        self.handle_outcome(outcome, &done_tx, counters);
                    }
                    None => {
                        events_open = false;
                        if !self.detector.is_processing() {
                            debug!("Press stream ended");
                            break;
                        }
                        debug!("Press stream ended, waiting for running trigger");
                    }
                },
            }
        }
    }

    fn handle_outcome(
        &self,
        outcome: PressOutcome,
        done_tx: &mpsc::UnboundedSender<bool>,
        counters: &Counters,
    ) {
        match outcome {
            PressOutcome::Trigger => {
                info!("Emergency gesture detected");
                self.launch(done_tx, counters);
            }
            PressOutcome::Pending => debug!("Gesture complete, waiting for running trigger"),
            PressOutcome::Invalidated => debug!("Gesture rejected"),
            PressOutcome::Recorded { .. } | PressOutcome::Idle => {}
        }
    }

    fn launch(&self, done_tx: &mpsc::UnboundedSender<bool>, counters: &Counters) {
        counters.triggers_fired.fetch_add(1, Ordering::SeqCst);
        counters.in_flight.store(true, Ordering::SeqCst);

        let action = Arc::clone(&self.action);
        let timeout = self.trigger_timeout;
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, action.fire())
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Timeout {
                            operation: format!("trigger action {}", action.name()),
                        })
                    }),
                None => action.fire().await,
            };

            let succeeded = match result {
                Ok(()) => {
                    info!(action = action.name(), "Trigger action completed");
                    true
                }
                Err(e) => {
                    warn!(action = action.name(), error = %e, "Trigger action failed");
                    false
                }
            };

            // The listener may be gone already
            let _ = done_tx.send(succeeded);
        });
    }
}
