//! Device reservation: liveness first, then the cross-process lock.
//!
//! # Candidate Order
//!
//! ```text
//! explicit name given?  ──yes──▶  { that device }            (single attempt)
//!        │ no
//!        ▼
//!  [default, rest of config in file order]  ──▶ first alive + lockable wins
//!        │ none
//!        ▼
//!  blocking? ──yes──▶ rescan until success or reservation timeout
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Lock I/O failures are logged and treated as "device unavailable"

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{Config, ReservationSettings};
use crate::device::Device;
use crate::error::{DeviceError, DeviceResult};
use crate::liveness::LivenessProbe;
use crate::lock::{DeviceLock, LockRegistry};

/// How a caller wants a device reserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReserveOptions {
    /// Reserve this device only, instead of scanning the configuration
    pub device: Option<String>,

    /// Require liveness but skip the exclusive lock
    pub no_lock: bool,

    /// Keep rescanning until a device frees up or the timeout elapses
    pub blocking: bool,
}

impl ReserveOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn no_lock(mut self) -> Self {
        self.no_lock = true;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }
}

/// Hands out devices to callers and tracks the locks it holds.
///
/// A manager passes explicitly to whatever needs it; there is no
/// process-wide instance.
pub struct DeviceManager {
    config: Config,
    locks: LockRegistry,
    probe: Arc<dyn LivenessProbe>,
    settings: ReservationSettings,
    held: Mutex<HashMap<String, DeviceLock>>,
}

impl DeviceManager {
    /// Creates a manager using the lock directory from the configuration.
    pub fn new(config: Config, probe: Arc<dyn LivenessProbe>) -> Self {
        let locks = LockRegistry::new(config.lock_dir());
        Self::with_locks(config, locks, probe)
    }

    /// Creates a manager over an explicit lock registry.
    pub fn with_locks(config: Config, locks: LockRegistry, probe: Arc<dyn LivenessProbe>) -> Self {
        let settings = config.reservation.clone();
        Self {
            config,
            locks,
            probe,
            settings,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the reservation timing settings.
    pub fn with_settings(mut self, settings: ReservationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Whether this manager currently holds the lock for a device.
    pub fn is_held(&self, device_name: &str) -> bool {
        self.held().contains_key(device_name)
    }

    /// Reserves a device.
    ///
    /// # Errors
    ///
    /// * `DeviceError::NotFound` - the named device is unconfigured, not
    ///   answering, or locked by someone else
    /// * `DeviceError::NoDevicesFound` - no candidate was available, or a
    ///   blocking scan hit the reservation timeout
    pub async fn reserve(&self, options: &ReserveOptions) -> DeviceResult<Device> {
        if let Some(name) = &options.device {
            return self.reserve_named(name, options.no_lock).await;
        }

        let scan = async {
            loop {
                if let Some(device) = self.reserve_any(options.no_lock).await {
                    return Some(device);
                }
                if !options.blocking {
                    return None;
                }
                debug!(
                    interval_ms = self.settings.poll_interval_ms,
                    "No device free, rescanning"
                );
                sleep(self.settings.poll_interval()).await;
            }
        };

        match timeout(self.settings.timeout(), scan).await {
            Ok(Some(device)) => {
                info!(device = %device, "Using Device");
                Ok(device)
            }
            Ok(None) => Err(DeviceError::NoDevicesFound),
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.timeout_secs,
                    "Gave up waiting for a free device"
                );
                Err(DeviceError::NoDevicesFound)
            }
        }
    }

    /// Releases a device reserved by this manager.
    ///
    /// Deletes the lock file and drops the `flock`. Devices reserved with
    /// `no_lock`, or never reserved here, are left alone so another
    /// process's lock file is never removed.
    pub fn release(&self, device: &Device) {
        let Some(lock) = self.held().remove(device.name()) else {
            debug!(device = %device, "Release without a held lock, nothing to do");
            return;
        };

        if let Err(e) = self.locks.remove(device.name()) {
            warn!(
                device = %device,
                path = %lock.path().display(),
                error = %e,
                "Failed to delete lock file"
            );
        }
        drop(lock);
        info!(device = %device, "Released device");
    }

    /// Deletes a device's lock file regardless of who wrote it.
    ///
    /// Intended for clearing the file left behind by a crashed holder.
    pub fn force_release(&self, device_name: &str) -> io::Result<()> {
        self.held().remove(device_name);
        self.locks.remove(device_name)?;
        info!(device = device_name, "Lock file removed");
        Ok(())
    }

    async fn reserve_named(&self, name: &str, no_lock: bool) -> DeviceResult<Device> {
        let not_found = || DeviceError::NotFound {
            name: name.to_string(),
        };

        let Some(device) = self.config.device(name) else {
            warn!(device = name, "Requested device is not configured");
            return Err(not_found());
        };

        if self.device_available(&device, no_lock).await {
            info!(device = %device, "Using Device");
            Ok(device)
        } else {
            Err(not_found())
        }
    }

    async fn reserve_any(&self, no_lock: bool) -> Option<Device> {
        for device in self.config.candidates() {
            if self.device_available(&device, no_lock).await {
                return Some(device);
            }
        }
        None
    }

    async fn device_available(&self, device: &Device, no_lock: bool) -> bool {
        if !self.probe.is_alive(device.ip()).await {
            debug!(device = %device, "Device did not answer ping");
            return false;
        }
        if no_lock {
            return true;
        }

        match self.locks.try_acquire(device.name()) {
            Ok(Some(lock)) => {
                self.held().insert(device.name().to_string(), lock);
                true
            }
            Ok(None) => {
                debug!(device = %device, "Device is reserved elsewhere");
                false
            }
            Err(e) => {
                warn!(device = %device, error = %e, "Failed to open device lock");
                false
            }
        }
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, DeviceLock>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}
