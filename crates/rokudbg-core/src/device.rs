//! The `Device` value handed out by a reservation.

use serde::Deserialize;
use std::fmt;

/// Connection details for one configured device, as written in the config file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    pub ip: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An immutable, named device.
///
/// Devices are created from configuration and never mutated. A `Device`
/// carries no lock state of its own; the `DeviceManager` that reserved it
/// tracks the lock.
#[derive(Clone, PartialEq, Eq)]
pub struct Device {
    name: String,
    ip: String,
    user: String,
    password: String,
}

impl Device {
    /// Creates a device from its configured name and connection details.
    pub fn new(name: impl Into<String>, config: &DeviceConfig) -> Self {
        Self {
            name: name.into(),
            ip: config.ip.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ip)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
