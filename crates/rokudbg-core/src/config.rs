//! Device configuration loaded from TOML.
//!
//! ```toml
//! default_device = "living-room"
//!
//! [devices.living-room]
//! ip = "192.168.1.20"
//! user = "rokudev"
//! password = "secret"
//! ```
//!
//! Devices keep the order they are written in, which is the order the
//! `DeviceManager` tries them after the default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::device::{Device, DeviceConfig};
use crate::error::ConfigError;

/// TCP port the device's debug server listens on.
pub const DEFAULT_DEBUG_PORT: u16 = 8081;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the device tried first when none is requested explicitly
    pub default_device: String,

    /// Configured devices in file order
    pub devices: IndexMap<String, DeviceConfig>,

    /// Shared directory holding per-device lock files
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub reservation: ReservationSettings,
}

/// Settings for the debug connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub debug_port: u16,
    pub connect_timeout_secs: u64,
    pub connect_retry_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debug_port: DEFAULT_DEBUG_PORT,
            connect_timeout_secs: 60,
            connect_retry_ms: 250,
        }
    }
}

impl SessionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

/// Settings for device reservation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReservationSettings {
    /// Overall ceiling for a blocking reservation
    pub timeout_secs: u64,
    /// Pause between full candidate scans in blocking mode
    pub poll_interval_ms: u64,
    pub ping_timeout_ms: u64,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            poll_interval_ms: 1000,
            ping_timeout_ms: 1000,
        }
    }
}

impl ReservationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses and validates configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if !self.devices.contains_key(&self.default_device) {
            return Err(ConfigError::UnknownDefault(self.default_device.clone()));
        }
        Ok(())
    }

    /// Looks up a configured device by name.
    pub fn device(&self, name: &str) -> Option<Device> {
        self.devices
            .get(name)
            .map(|config| Device::new(name, config))
    }

    /// Reservation candidates: the default device first, then every other
    /// device in configuration order.
    pub fn candidates(&self) -> Vec<Device> {
        let default = self.device(&self.default_device);
        let rest = self
            .devices
            .iter()
            .filter(|(name, _)| **name != self.default_device)
            .map(|(name, config)| Device::new(name.as_str(), config));
        default.into_iter().chain(rest).collect()
    }

    /// Lock directory, falling back to the system temp directory.
    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
