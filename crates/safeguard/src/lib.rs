//! `safeguard` - Emergency alert trigger driven by power button gestures
//!
//! This library watches a stream of screen on/off ticks for a rapid press
//! pattern and raises an emergency alert when it sees one. It also keeps the
//! local alert store the CLI works with.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod haptics;
pub mod listener;
pub mod location;
pub mod logging;
pub mod service;
pub mod source;
pub mod storage;
pub mod trigger;

pub use alert::{Alert, AlertCategory, AlertStatus, AlertUpdate, GeoPoint, Group, Subject};
pub use config::Config;
pub use detector::{PressOutcome, PressPattern, PressPatternDetector};
pub use error::{Error, Result};
pub use listener::{ListenerHandle, ListenerStatus, PressListener};
pub use logging::init_logging;
pub use service::{AlertService, RaiseRequest};
pub use source::{PressEvent, PressKind, PressSource, SourceHandle};
pub use storage::{Storage, StorageStats};
pub use trigger::{EmergencyAlert, TriggerAction};
