//! Error types for the debug connection and session.

use std::io;
use std::time::Duration;

use rokudbg_core::DeviceError;
use rokudbg_protocol::{CodecError, ProtocolError};
use thiserror::Error;

/// Connection-level failures. Fatal to the current session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device kept refusing connections past the connect ceiling
    #[error("Connection to {addr} refused for {}s", waited.as_secs())]
    ConnectTimeout { addr: String, waited: Duration },

    /// Connecting failed with a non-retryable error
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The device closed the debug connection
    #[error("Connection closed by device")]
    Closed,

    /// The connection was abandoned after a protocol error
    #[error("Connection is unusable after an earlier failure")]
    Unusable,

    /// Reset, timeout or other socket error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Everything that can end a debug session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        Self::Transport(TransportError::Io(error))
    }
}

impl From<CodecError> for SessionError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Protocol(e) => Self::Protocol(e),
            CodecError::Io(e) => Self::Transport(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_keeps_taxonomy() {
        let protocol: SessionError = CodecError::Protocol(ProtocolError::UndefinedUpdateType).into();
        assert!(matches!(
            protocol,
            SessionError::Protocol(ProtocolError::UndefinedUpdateType)
        ));

        let io_error = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let transport: SessionError = CodecError::Io(io_error).into();
        assert!(matches!(
            transport,
            SessionError::Transport(TransportError::Io(_))
        ));
    }

    #[test]
    fn test_connect_timeout_display() {
        let error = TransportError::ConnectTimeout {
            addr: "10.0.0.2:8081".to_string(),
            waited: Duration::from_secs(60),
        };
        assert_eq!(error.to_string(), "Connection to 10.0.0.2:8081 refused for 60s");
    }

    #[test]
    fn test_device_error_passthrough() {
        let error: SessionError = DeviceError::NoDevicesFound.into();
        assert_eq!(error.to_string(), "No Devices Found");
    }
}
