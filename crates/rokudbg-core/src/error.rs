//! Error types for device configuration and reservation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned when a device cannot be reserved.
///
/// Lock contention and failed liveness are deliberately folded into the
/// same variants: callers only learn that the device could not be had.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// An explicitly named device is unreachable, busy or not configured
    #[error("Device {name} not found")]
    NotFound { name: String },

    /// No configured device passed both the liveness probe and the lock
    #[error("No Devices Found")]
    NoDevicesFound,
}

/// Result type for reservation operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors that can occur while loading the device configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No devices are configured at all
    #[error("No devices configured")]
    NoDevices,

    /// `default_device` names a device missing from `[devices]`
    #[error("Default device {0} is not configured")]
    UnknownDefault(String),
}
