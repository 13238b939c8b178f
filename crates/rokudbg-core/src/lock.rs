//! Per-device advisory lock files.
//!
//! Each device maps to one file named after it inside a shared directory.
//! A reservation holds an exclusive `flock` on that file and has written
//! its identity (the process id) into it. Any process pointed at the same
//! directory sees the reservation.
//!
//! Release deletes the file. Between one holder's unlink and another
//! process's open of the old path there is a narrow window in which two
//! processes can each hold a lock on a different inode for the same name.
//! This is inherent to lock-by-file-name and is accepted.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - I/O failures are returned as `io::Error`, contention as `Ok(None)`

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process;

use fs2::FileExt;
use tracing::{debug, warn};

// ============================================================================
// Lock Registry
// ============================================================================

/// Lock files for every device, rooted at one shared directory.
#[derive(Debug, Clone)]
pub struct LockRegistry {
    dir: PathBuf,
    identity: String,
}

impl LockRegistry {
    /// Creates a registry that identifies itself by the current process id.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_identity(dir, process::id().to_string())
    }

    /// Creates a registry with an explicit identity string.
    ///
    /// Distinct identities over the same directory behave like distinct
    /// processes.
    pub fn with_identity(dir: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            identity: identity.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Path of the lock file for a device.
    pub fn lock_path(&self, device_name: &str) -> PathBuf {
        self.dir.join(device_name)
    }

    /// Attempts to take the exclusive lock for a device without waiting.
    ///
    /// Returns `Ok(None)` when the device is in use: another holder owns the
    /// `flock`, the file still carries a previous owner's identity, or the
    /// identity read back after writing does not match ours.
    pub fn try_acquire(&self, device_name: &str) -> io::Result<Option<DeviceLock>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(device_name);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                debug!(device = device_name, "Lock held by another reservation");
                return Ok(None);
            }
            return Err(e);
        }

        let existing = read_all(&mut file)?;
        if !existing.trim().is_empty() {
            warn!(
                device = device_name,
                owner = existing.trim(),
                path = %path.display(),
                "Lock file has a previous owner; treating device as in use"
            );
            unlock_quietly(&file);
            return Ok(None);
        }

        file.write_all(self.identity.as_bytes())?;
        file.flush()?;

        let written = read_all(&mut file)?;
        if written != self.identity {
            warn!(
                device = device_name,
                expected = %self.identity,
                found = %written,
                "Lock file content changed underneath us"
            );
            unlock_quietly(&file);
            return Ok(None);
        }

        debug!(device = device_name, path = %path.display(), "Lock acquired");
        Ok(Some(DeviceLock { file, path }))
    }

    /// Reads the identity recorded in a device's lock file, if any.
    pub fn owner(&self, device_name: &str) -> io::Result<Option<LockOwner>> {
        match fs::read_to_string(self.lock_path(device_name)) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(LockOwner::new(content.trim()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes the lock file for a device. A missing file is not an error.
    pub fn remove(&self, device_name: &str) -> io::Result<()> {
        match fs::remove_file(self.lock_path(device_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn read_all(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

fn unlock_quietly(file: &File) {
    if let Err(e) = FileExt::unlock(file) {
        debug!(error = %e, "Failed to unlock lock file");
    }
}

// ============================================================================
// Held Lock
// ============================================================================

/// An acquired device lock. Dropping it releases the `flock`.
#[derive(Debug)]
pub struct DeviceLock {
    file: File,
    path: PathBuf,
}

impl DeviceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        unlock_quietly(&self.file);
    }
}

// ============================================================================
// Lock Owner
// ============================================================================

/// Identity found in a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    identity: String,
}

impl LockOwner {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Process id of the owner, when the identity is one.
    pub fn pid(&self) -> Option<u32> {
        self.identity.parse().ok()
    }

    /// Whether the owning process still exists.
    ///
    /// Returns `None` when the identity is not a process id.
    pub fn is_running(&self) -> Option<bool> {
        let pid = i32::try_from(self.pid()?).ok()?;
        #[cfg(unix)]
        {
            // Signal 0 only checks for existence; EPERM means it exists
            // but belongs to another user.
            let result = unsafe { libc::kill(pid, 0) };
            if result == 0 {
                return Some(true);
            }
            Some(io::Error::last_os_error().raw_os_error() == Some(libc::EPERM))
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            None
        }
    }
}
