//! Press event sources.
//!
//! A [`PressSource`] delivers screen on/off (power button) ticks to the
//! listener through an `mpsc` channel. Sources stamp each event with a
//! monotonic arrival instant; the detector never looks at wall-clock time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// What kind of tick a source observed. The detector treats them alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressKind {
    /// The screen turned on.
    ScreenOn,
    /// The screen turned off.
    ScreenOff,
    /// A bare power button press.
    Button,
}

impl std::fmt::Display for PressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScreenOn => write!(f, "screen_on"),
            Self::ScreenOff => write!(f, "screen_off"),
            Self::Button => write!(f, "button"),
        }
    }
}

/// A single press tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    /// When the tick arrived.
    pub at: Instant,
    /// What was observed.
    pub kind: PressKind,
}

impl PressEvent {
    /// Create an event stamped now.
    #[must_use]
    pub fn now(kind: PressKind) -> Self {
        Self {
            at: Instant::now(),
            kind,
        }
    }
}

/// Status of a press source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    /// Source name.
    pub name: &'static str,
    /// Whether the source is currently running.
    pub is_running: bool,
    /// Events delivered since startup.
    pub event_count: u64,
}

/// A trait for press event sources.
#[async_trait::async_trait]
pub trait PressSource: Send {
    /// The name of this source (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Check if the source is currently running.
    fn is_running(&self) -> bool;

    /// Get the current status of the source.
    fn status(&self) -> SourceStatus;

    /// Get a handle that can stop the source from another task.
    fn stop_handle(&self) -> SourceHandle;

    /// Deliver events through `tx` until stopped, the input ends, or the
    /// receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is already running or cannot start.
    async fn start(&mut self, tx: mpsc::Sender<PressEvent>) -> Result<()>;

    /// Stop the source.
    fn stop(&self) {
        self.stop_handle().stop();
    }
}

/// A cloneable handle that stops a running source.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    name: &'static str,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
}

impl SourceHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
        }
    }

    /// Name of the source this handle controls.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the source to stop.
    pub fn stop(&self) {
        debug!(source = self.name, "Stopping press source");
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    /// Check if the source is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the source as running; fails if it already was.
    fn begin(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::SourceAlreadyRunning { name: self.name });
        }
        Ok(())
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Resolves once `stop()` has been called.
    async fn stopped(&self) {
        self.stop_signal.notified().await;
    }
}

/// Parse one line of the line protocol.
///
/// `on` and `off` are screen transitions; `press` and blank lines are bare
/// presses. Lines starting with `#` are comments. Matching ignores case and
/// surrounding whitespace.
#[must_use]
pub fn parse_press_line(line: &str) -> Option<PressKind> {
    let token = line.trim();
    if token.starts_with('#') {
        return None;
    }
    match token.to_ascii_lowercase().as_str() {
        "on" | "screen_on" => Some(PressKind::ScreenOn),
        "off" | "screen_off" => Some(PressKind::ScreenOff),
        "" | "press" | "p" => Some(PressKind::Button),
        _ => None,
    }
}

/// Reads presses from newline-delimited text.
///
/// Useful on terminals (hit Enter five times) and for piping events from
/// other tools.
#[derive(Debug)]
pub struct LinePressSource<R> {
    reader: Option<R>,
    handle: SourceHandle,
    event_count: Arc<AtomicU64>,
}

impl LinePressSource<BufReader<Stdin>> {
    /// Read presses from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LinePressSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Read presses from the given reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            handle: SourceHandle::new("line"),
            event_count: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl<R> PressSource for LinePressSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &'static str {
        self.handle.name()
    }

    fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    fn status(&self) -> SourceStatus {
        SourceStatus {
            name: self.name(),
            is_running: self.is_running(),
            event_count: self.event_count.load(Ordering::SeqCst),
        }
    }

    fn stop_handle(&self) -> SourceHandle {
        self.handle.clone()
    }

    async fn start(&mut self, tx: mpsc::Sender<PressEvent>) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Err(Error::source_start(self.name(), "input already consumed"));
        };
        self.handle.begin()?;
        debug!(source = self.name(), "Starting press source");

        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                () = self.handle.stopped() => break,
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    let Some(kind) = parse_press_line(&line) else {
                        if !line.trim_start().starts_with('#') {
                            warn!(line = %line.trim(), "Unrecognized press line, ignoring");
                        }
                        continue;
                    };
                    self.event_count.fetch_add(1, Ordering::SeqCst);
                    trace!(%kind, "Press line received");
                    if tx.send(PressEvent::now(kind)).await.is_err() {
                        debug!("Press channel closed, stopping source");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Press input ended");
                    break;
                }
                Err(e) => {
                    self.handle.finish();
                    return Err(e.into());
                }
            }
        }

        self.handle.finish();
        debug!(source = self.name(), "Press source stopped");
        Ok(())
    }
}

/// Power button presses from the acpid socket.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct AcpiPressSource {
    inner: safeguard_linux::AcpiPowerButtonMonitor,
    handle: SourceHandle,
    event_count: Arc<AtomicU64>,
}

#[cfg(target_os = "linux")]
impl AcpiPressSource {
    /// Create a source from the `source` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the event pattern does not compile.
    pub fn from_config(config: &crate::config::SourceConfig) -> Result<Self> {
        let inner = safeguard_linux::AcpiPowerButtonMonitor::new(
            safeguard_linux::AcpiConfig {
                socket_path: config.acpi_socket_path.clone(),
                event_pattern: config.acpi_event_pattern.clone(),
            },
        )
        .map_err(|e| Error::source_start("acpi", e.to_string()))?;

        Ok(Self {
            inner,
            handle: SourceHandle::new("acpi"),
            event_count: Arc::new(AtomicU64::new(0)),
        })
    }
}

#[cfg(target_os = "linux")]
#[async_trait::async_trait]
impl PressSource for AcpiPressSource {
    fn name(&self) -> &'static str {
        self.handle.name()
    }

    fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    fn status(&self) -> SourceStatus {
        SourceStatus {
            name: self.name(),
            is_running: self.is_running(),
            event_count: self.event_count.load(Ordering::SeqCst),
        }
    }

    fn stop_handle(&self) -> SourceHandle {
        self.handle.clone()
    }

    async fn start(&mut self, tx: mpsc::Sender<PressEvent>) -> Result<()> {
        self.handle.begin()?;

        let (internal_tx, mut internal_rx) =
            mpsc::channel::<safeguard_linux::PowerButtonPress>(32);
        let event_count = Arc::clone(&self.event_count);

        // Convert platform presses into press events
        tokio::spawn(async move {
            while let Some(press) = internal_rx.recv().await {
                event_count.fetch_add(1, Ordering::SeqCst);
                let event = PressEvent {
                    at: press.at,
                    kind: PressKind::Button,
                };
                if tx.send(event).await.is_err() {
                    debug!("Press channel closed");
                    break;
                }
            }
        });

        let inner_stop = self.inner.stop_handle();
        let result = tokio::select! {
            () = self.handle.stopped() => {
                inner_stop.stop();
                Ok(())
            }
            result = self.inner.start(internal_tx) => {
                result.map_err(|e| Error::source_start("acpi", e.to_string()))
            }
        };

        self.handle.finish();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_kind_display() {
        assert_eq!(PressKind::ScreenOn.to_string(), "screen_on");
        assert_eq!(PressKind::ScreenOff.to_string(), "screen_off");
        assert_eq!(PressKind::Button.to_string(), "button");
    }

    #[test]
    fn test_parse_press_line() {
        assert_eq!(parse_press_line("on"), Some(PressKind::ScreenOn));
        assert_eq!(parse_press_line("  OFF "), Some(PressKind::ScreenOff));
        assert_eq!(parse_press_line(""), Some(PressKind::Button));
        assert_eq!(parse_press_line("press"), Some(PressKind::Button));
        assert_eq!(parse_press_line("# comment"), None);
        assert_eq!(parse_press_line("volume_up"), None);
    }

    #[test]
    fn test_source_handle_stop() {
        let handle = SourceHandle::new("test");
        handle.begin().unwrap();
        assert!(handle.is_running());

        let clone = handle.clone();
        clone.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_source_handle_begin_twice() {
        let handle = SourceHandle::new("test");
        handle.begin().unwrap();
        let err = handle.begin().unwrap_err();
        assert!(matches!(err, Error::SourceAlreadyRunning { name: "test" }));
    }

    #[tokio::test]
    async fn test_line_source_delivers_events() {
        let input: &[u8] = b"on\noff\n# ignored\nbogus\n\npress\n";
        let mut source = LinePressSource::new(input);
        let (tx, mut rx) = mpsc::channel(16);

        source.start(tx).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                PressKind::ScreenOn,
                PressKind::ScreenOff,
                PressKind::Button,
                PressKind::Button
            ]
        );
        let status = source.status();
        assert_eq!(status.event_count, 4);
        assert!(!status.is_running);
    }

    #[tokio::test]
    async fn test_line_source_cannot_restart() {
        let input: &[u8] = b"";
        let mut source = LinePressSource::new(input);
        let (tx, _rx) = mpsc::channel(1);

        source.start(tx.clone()).await.unwrap();
        assert!(source.start(tx).await.is_err());
    }

    #[tokio::test]
    async fn test_line_source_stops_on_signal() {
        // A reader that never produces a line
        let (_writer, reader) = tokio::io::duplex(64);
        let mut source = LinePressSource::new(BufReader::new(reader));
        let handle = source.stop_handle();
        let (tx, _rx) = mpsc::channel(1);

        handle.stop();
        source.start(tx).await.unwrap();
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn test_line_source_stops_when_receiver_dropped() {
        let input: &[u8] = b"on\non\non\n";
        let mut source = LinePressSource::new(input);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        source.start(tx).await.unwrap();
        assert_eq!(source.status().event_count, 1);
    }
}
