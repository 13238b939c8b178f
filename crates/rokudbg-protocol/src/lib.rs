//! rokudbg Protocol - BrightScript remote debug wire format
//!
//! This crate is pure data transformation; it never touches a socket.
//! - `handshake` - magic exchange and version/trailer decoding
//! - `codec` - length-prefixed packet framing (`tokio_util::codec`)
//! - `message` - typed updates and command responses
//! - `correlation` - request ids and the outstanding-request table
//! - `builder` - device-side encoding, for simulators and tests
//!
//! All integers on the wire are little-endian.

pub mod builder;
pub mod codec;
pub mod correlation;
pub mod error;
pub mod handshake;
pub mod message;
pub mod request;
pub mod version;
mod wire;

pub use builder::{parse_request, PacketBuilder};
pub use codec::{Packet, PacketCodec, MAX_PACKET_LEN, MIN_PACKET_LEN};
pub use correlation::ProtocolSession;
pub use error::{CodecError, ProtocolError};
pub use handshake::{HandshakeTrailer, MAGIC};
pub use message::{
    CommandResult, CompileErrors, Message, Response, ResponseBody, RuntimeError, StackFrame,
    StopInfo, ThreadInfo, Update,
};
pub use request::{CommandKind, OutgoingRequest, Request};
pub use version::{ProtocolVersion, SUPPORTED_VERSIONS};
