//! Reachability checks run before a device is handed out.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Answers whether a device address is currently reachable.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_alive(&self, ip: &str) -> bool;
}

// ============================================================================
// ICMP echo via the system ping binary
// ============================================================================

/// Sends a single ICMP echo request using the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_alive(&self, ip: &str) -> bool {
        // `-W` takes whole seconds on Linux
        let wait_secs = self.timeout.as_secs().max(1).to_string();
        let status = Command::new("ping")
            .args(["-c", "1", "-W", wait_secs.as_str(), ip])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // Leave the child a little slack beyond its own timeout
        let ceiling = self.timeout + Duration::from_millis(500);
        match timeout(ceiling, status).await {
            Ok(Ok(status)) => {
                debug!(ip, alive = status.success(), "Ping finished");
                status.success()
            }
            Ok(Err(e)) => {
                debug!(ip, error = %e, "Failed to run ping");
                false
            }
            Err(_) => {
                debug!(ip, "Ping timed out");
                false
            }
        }
    }
}

// ============================================================================
// Fixed answer set
// ============================================================================

/// Probe with a fixed set of reachable addresses.
///
/// Useful for tests and for environments where ICMP is blocked but the
/// devices are known to be present.
#[derive(Debug, Default)]
pub struct StaticProbe {
    alive: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new<I, S>(alive: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alive: Mutex::new(alive.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Marks an address reachable or unreachable.
    pub fn set_alive(&self, ip: &str, alive: bool) {
        let mut set = self.alive.lock().unwrap_or_else(|e| e.into_inner());
        if alive {
            set.insert(ip.to_string());
        } else {
            set.remove(ip);
        }
    }

    /// Number of probes answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn is_alive(&self, ip: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.alive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(ip)
    }
}
