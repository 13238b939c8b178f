//! Protocol error types.
//!
//! Every `ProtocolError` means the stream is corrupt or the device speaks a
//! version we do not; none of them are retried.

use std::io;
use thiserror::Error;

use crate::version::ProtocolVersion;

/// Fatal protocol violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The device did not echo the handshake magic
    #[error("Non-matching magic numbers (received {received:#018x})")]
    BadMagic { received: u64 },

    /// The device announced a version outside the allow-list
    #[error("Unsupported version {0}")]
    UnsupportedVersion(ProtocolVersion),

    /// The handshake trailer declared fewer bytes than its own header
    #[error("Invalid handshake trailer length {0}")]
    InvalidTrailer(u32),

    /// A command was issued before a successful handshake
    #[error("Handshake has not completed")]
    HandshakeIncomplete,

    /// An unsolicited update with type 0
    #[error("Undefined update type")]
    UndefinedUpdateType,

    /// A response for a request id that is not outstanding
    #[error("Unknown request id: {0}")]
    UnknownRequestId(u32),

    /// A request carried a command code this side does not know
    #[error("Unknown command code {0}")]
    UnknownCommand(u32),

    /// A packet length outside the accepted bounds
    #[error("Invalid packet length {0}")]
    InvalidPacketLength(u32),

    /// Known fields ran past the end of the packet or stream
    #[error("Unexpected EOF reading debug stream (needed {needed} bytes, {remaining} left)")]
    ShortRead { needed: usize, remaining: usize },

    /// A string ran to the end of the packet without a NUL terminator
    #[error("Unterminated string in packet")]
    UnterminatedString,
}

/// Error type for the packet codec.
///
/// `tokio_util::codec` requires codec errors to absorb `io::Error`.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
