//! Handshake decoding.
//!
//! ```text
//! client → device   u64 MAGIC
//! device → client   u64 MAGIC (echo)
//!                   u32 major, u32 minor, u32 patch
//!                   -- major >= 3 only --
//!                   u32 trailer_length (counts itself and the timestamp)
//!                   i64 revision_timestamp (ms since epoch)
//!                   trailer_length - 12 bytes, discarded
//! ```

use bytes::Buf;
use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::version::ProtocolVersion;

/// "bsdebug\0" read as a little-endian u64.
pub const MAGIC: u64 = 29_120_988_069_524_322;

pub const MAGIC_LEN: usize = 8;
pub const VERSION_LEN: usize = 12;
pub const TRAILER_HEADER_LEN: usize = 12;

/// Upper bound on discarded trailer bytes.
pub const MAX_TRAILER_EXTRA: usize = 64 * 1024;

/// Bytes the client sends to open the handshake.
pub fn magic_bytes() -> [u8; MAGIC_LEN] {
    MAGIC.to_le_bytes()
}

/// Verifies the device's echo of the magic.
pub fn check_magic(echo: [u8; MAGIC_LEN]) -> Result<(), ProtocolError> {
    let received = u64::from_le_bytes(echo);
    if received == MAGIC {
        Ok(())
    } else {
        Err(ProtocolError::BadMagic { received })
    }
}

/// Decodes the version triple and checks it against the allow-list.
pub fn decode_version(bytes: [u8; VERSION_LEN]) -> Result<ProtocolVersion, ProtocolError> {
    let mut buf = &bytes[..];
    let version = ProtocolVersion::new(buf.get_u32_le(), buf.get_u32_le(), buf.get_u32_le());
    version.ensure_supported()
}

/// Fixed-size head of the handshake trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTrailer {
    pub length: u32,
    pub revision_timestamp_ms: i64,
}

impl HandshakeTrailer {
    pub fn decode(bytes: [u8; TRAILER_HEADER_LEN]) -> Result<Self, ProtocolError> {
        let mut buf = &bytes[..];
        let length = buf.get_u32_le();
        let revision_timestamp_ms = buf.get_i64_le();
        let trailer = Self {
            length,
            revision_timestamp_ms,
        };
        if (length as usize) < TRAILER_HEADER_LEN
            || trailer.extra_len() > MAX_TRAILER_EXTRA
        {
            return Err(ProtocolError::InvalidTrailer(length));
        }
        Ok(trailer)
    }

    /// Bytes following the header that must be read and discarded.
    pub fn extra_len(&self) -> usize {
        (self.length as usize).saturating_sub(TRAILER_HEADER_LEN)
    }

    /// Platform revision timestamp, when it is a representable instant.
    pub fn revision_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.revision_timestamp_ms)
    }
}
