//! rokudbg Core - Device reservation for shared set-top devices
//!
//! This crate provides the pieces that decide *which* device a tool
//! invocation may use:
//! - `config` - device configuration loaded from TOML
//! - `lock` - per-device advisory lock files in a shared directory
//! - `liveness` - reachability probing before a device is handed out
//! - `manager` - `DeviceManager`, combining the two into reserve/release
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod device;
pub mod error;
pub mod liveness;
pub mod lock;
pub mod manager;

// Re-exports for convenience
pub use config::{Config, ReservationSettings, SessionSettings, DEFAULT_DEBUG_PORT};
pub use device::{Device, DeviceConfig};
pub use error::{ConfigError, DeviceError, DeviceResult};
pub use liveness::{LivenessProbe, PingProbe, StaticProbe};
pub use lock::{DeviceLock, LockOwner, LockRegistry};
pub use manager::{DeviceManager, ReserveOptions};
