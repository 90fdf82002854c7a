//! Power button monitoring through acpid.
//!
//! acpid broadcasts every ACPI event as a text line on a Unix socket, e.g.
//! `button/power PBTN 00000080 00000000`. The monitor connects to that socket
//! and forwards lines matching the configured pattern as presses.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Errors that can occur while monitoring acpid.
#[derive(Debug, Error)]
pub enum AcpiError {
    /// The event pattern is not a valid regex.
    #[error("invalid acpid event pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Could not connect to the acpid socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        /// Socket path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from the socket failed.
    #[error("failed to read acpid event: {0}")]
    Read(#[from] std::io::Error),

    /// The monitor is already running.
    #[error("acpid monitor already running")]
    AlreadyRunning,
}

/// Result type for acpid operations.
pub type Result<T> = std::result::Result<T, AcpiError>;

/// A power button press reported by acpid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerButtonPress {
    /// When the event line arrived.
    pub at: Instant,
    /// The raw event line.
    pub line: String,
}

/// Configuration for the acpid monitor.
#[derive(Debug, Clone)]
pub struct AcpiConfig {
    /// Path to the acpid socket.
    pub socket_path: PathBuf,
    /// Regex an event line must match to count as a press.
    pub event_pattern: String,
}

impl Default for AcpiConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/acpid.socket"),
            event_pattern: r"^button/power\b".to_string(),
        }
    }
}

/// Watches the acpid socket for power button events.
#[derive(Debug)]
pub struct AcpiPowerButtonMonitor {
    socket_path: PathBuf,
    pattern: Regex,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
}

impl AcpiPowerButtonMonitor {
    /// Create a monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the event pattern does not compile.
    pub fn new(config: AcpiConfig) -> Result<Self> {
        Ok(Self {
            socket_path: config.socket_path,
            pattern: Regex::new(&config.event_pattern)?,
            running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
        })
    }

    /// Check if the monitor is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check whether an event line is a power button press.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line.trim())
    }

    /// Connect to acpid and forward presses through `tx`.
    ///
    /// Runs until `stop()` is called, the socket closes, or the receiver is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor is already running, the socket cannot
    /// be opened, or a read fails.
    pub async fn start(&mut self, tx: mpsc::Sender<PowerButtonPress>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AcpiError::AlreadyRunning);
        }

        debug!(path = %self.socket_path.display(), "Connecting to acpid");
        let stream = match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => stream,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(AcpiError::Connect {
                    path: self.socket_path.clone(),
                    source,
                });
            }
        };

        let result = self.forward(BufReader::new(stream), &tx).await;
        self.running.store(false, Ordering::SeqCst);
        debug!("acpid monitor stopped");
        result
    }

    /// Forward matching lines from an event stream until it ends or
    /// `stop()` is called.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails.
    pub async fn forward<R>(&self, reader: R, tx: &mpsc::Sender<PowerButtonPress>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                () = self.stop_signal.notified() => {
                    debug!("acpid monitor stop requested");
                    return Ok(());
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };

            if !self.matches(&line) {
                trace!(line = %line, "Ignoring acpid event");
                continue;
            }
            debug!(line = %line, "Power button event");
            let press = PowerButtonPress {
                at: Instant::now(),
                line,
            };
            if tx.send(press).await.is_err() {
                debug!("Press channel closed, stopping acpid monitor");
                return Ok(());
            }
        }
        warn!("acpid closed the event socket");
        Ok(())
    }

    /// Stop the monitor.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Get a handle that can be used to stop the monitor from another task.
    #[must_use]
    pub fn stop_handle(&self) -> AcpiMonitorHandle {
        AcpiMonitorHandle {
            running: Arc::clone(&self.running),
            stop_signal: Arc::clone(&self.stop_signal),
        }
    }
}

/// A handle to control a running acpid monitor.
#[derive(Debug, Clone)]
pub struct AcpiMonitorHandle {
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
}

impl AcpiMonitorHandle {
    /// Signal the monitor to stop. A pending socket read is abandoned.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    /// Check if the monitor is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> AcpiPowerButtonMonitor {
        AcpiPowerButtonMonitor::new(AcpiConfig::default()).unwrap()
    }

    #[test]
    fn test_default_pattern_matches_power_button() {
        let m = monitor();
        assert!(m.matches("button/power PBTN 00000080 00000000"));
        assert!(m.matches("button/power LNXPWRBN:00 00000080 00000001\n"));
        assert!(!m.matches("button/lid LID close"));
        assert!(!m.matches("ac_adapter ACPI0003:00 00000080 00000001"));
        assert!(!m.matches("button/powerx"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = AcpiPowerButtonMonitor::new(AcpiConfig {
            event_pattern: "[broken".to_string(),
            ..AcpiConfig::default()
        });
        assert!(matches!(result, Err(AcpiError::InvalidPattern(_))));
    }

    #[test]
    fn test_stop_handle() {
        let m = monitor();
        let handle = m.stop_handle();
        m.running.store(true, Ordering::SeqCst);
        assert!(handle.is_running());

        handle.stop();
        assert!(!m.is_running());
    }

    #[tokio::test]
    async fn test_forward_filters_lines() {
        let m = monitor();
        let input: &[u8] = b"button/power PBTN 00000080 00000000\n\
            button/lid LID close\n\
            button/power PBTN 00000080 00000001\n";
        let (tx, mut rx) = mpsc::channel(8);

        m.forward(input, &tx).await.unwrap();
        drop(tx);

        let mut lines = Vec::new();
        while let Some(press) = rx.recv().await {
            lines.push(press.line);
        }
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("button/power")));
    }

    #[tokio::test]
    async fn test_stop_before_forward_returns_at_once() {
        let m = monitor();
        // A stream that never produces a line
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(1);

        m.stop();
        m.forward(BufReader::new(reader), &tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_handle_interrupts_blocked_read() {
        let m = monitor();
        let handle = m.stop_handle();
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(8);

        let stopper = async {
            use tokio::io::AsyncWriteExt;
            writer
                .write_all(b"button/power PBTN 00000080 00000000\n")
                .await
                .unwrap();
            // Wait until the press arrived, then stop while the read is pending
            let press = rx.recv().await.unwrap();
            handle.stop();
            press
        };

        let (result, press) = tokio::join!(m.forward(BufReader::new(reader), &tx), stopper);
        result.unwrap();
        assert!(press.line.starts_with("button/power"));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_start_without_socket() {
        let mut m = AcpiPowerButtonMonitor::new(AcpiConfig {
            socket_path: PathBuf::from("/nonexistent/acpid.socket"),
            ..AcpiConfig::default()
        })
        .unwrap();
        let (tx, _rx) = mpsc::channel(1);

        let err = m.start(tx).await.unwrap_err();
        assert!(matches!(err, AcpiError::Connect { .. }));
        assert!(!m.is_running());
    }
}
