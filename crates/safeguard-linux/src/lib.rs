//! Linux-specific implementation for safeguard
//!
//! This crate provides Linux-specific functionality for the safeguard project:
//! power button presses read from the acpid event socket.

#![cfg(target_os = "linux")]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod acpi;

pub use acpi::{
    AcpiConfig, AcpiError, AcpiMonitorHandle, AcpiPowerButtonMonitor, PowerButtonPress,
};

/// Initialize Linux-specific components
///
/// # Errors
///
/// Returns an error if initialization fails
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Initializing Linux platform components");
    Ok(())
}

/// Get platform name
#[must_use]
pub fn platform_name() -> &'static str {
    "Linux"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "Linux");
    }

    #[test]
    fn test_acpi_exports() {
        let monitor = AcpiPowerButtonMonitor::new(AcpiConfig::default()).unwrap();
        assert!(!monitor.is_running());
    }
}
