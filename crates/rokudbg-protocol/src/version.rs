//! Debug protocol versions and the supported allow-list.

use std::fmt;

use crate::error::ProtocolError;

/// Protocol version announced by the device during the handshake.
///
/// Only exact matches against `SUPPORTED_VERSIONS` are accepted; there
/// is no "compatible minor" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Versions this client decodes, newest first.
pub const SUPPORTED_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::new(3, 1, 0),
    ProtocolVersion::new(3, 0, 0),
];

impl ProtocolVersion {
    /// Creates a new ProtocolVersion.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if the version is on the allow-list.
    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(self)
    }

    /// Rejects versions outside the allow-list.
    pub fn ensure_supported(self) -> Result<Self, ProtocolError> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(ProtocolError::UnsupportedVersion(self))
        }
    }

    /// Major version 3 onwards append a length-declared trailer to the
    /// handshake.
    pub fn has_handshake_trailer(&self) -> bool {
        self.major >= 3
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
