//! Packet framing.
//!
//! ```text
//! u32 packet_length | u32 request_id | u32 error_code | body...
//! └────────────── packet_length bytes in total ───────────────┘
//! ```
//!
//! The declared length is authoritative. A frame is only yielded once all
//! of it has arrived, and the whole frame leaves the buffer at once, so
//! fields a newer device appends never desynchronize the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{CodecError, ProtocolError};
use crate::request::{OutgoingRequest, Request};

/// Length prefix, request id and error code.
pub const MIN_PACKET_LEN: usize = 12;

/// Maximum incoming packet size (1 MB)
pub const MAX_PACKET_LEN: usize = 1_048_576;

/// One framed incoming packet, body not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Value of the length prefix; the packet's total size on the wire
    pub declared_length: usize,
    pub request_id: u32,
    pub error_code: u32,
    /// Everything after `error_code`
    pub body: Bytes,
}

/// Framing codec: decodes incoming packets, encodes outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut prefix = &src[..];
        let raw_length = prefix.get_u32_le();
        let declared_length = raw_length as usize;
        if !(MIN_PACKET_LEN..=MAX_PACKET_LEN).contains(&declared_length) {
            return Err(ProtocolError::InvalidPacketLength(raw_length).into());
        }

        if src.len() < declared_length {
            src.reserve(declared_length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(declared_length).freeze();
        frame.advance(4);
        let request_id = frame.get_u32_le();
        let error_code = frame.get_u32_le();

        debug!(
            request_id,
            error_code,
            declared_length,
            "Received packet"
        );

        Ok(Some(Packet {
            declared_length,
            request_id,
            error_code,
            body: frame,
        }))
    }
}

impl Encoder<OutgoingRequest> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: OutgoingRequest, dst: &mut BytesMut) -> Result<(), CodecError> {
        let kind = item.request.kind();
        dst.reserve(kind.declared_size() as usize);
        dst.put_u32_le(kind.declared_size());
        dst.put_u32_le(item.request_id);
        dst.put_u32_le(kind.code());
        if let Request::Stacktrace { thread_index } = item.request {
            dst.put_u32_le(thread_index);
        }
        debug!(request_id = item.request_id, command = kind.name(), "Encoded request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CommandKind;

    fn frame(request_id: u32, error_code: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((12 + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(&request_id.to_le_bytes());
        out.extend_from_slice(&error_code.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_waits_for_complete_frame() {
        let bytes = frame(3, 0, &[1, 2, 3, 4]);
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&bytes[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10, "partial frame stays buffered");

        buf.extend_from_slice(&bytes[10..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.request_id, 3);
        assert_eq!(packet.declared_length, 16);
        assert_eq!(&packet.body[..], &[1, 2, 3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut bytes = frame(1, 0, b"ab");
        bytes.extend(frame(2, 5, b""));
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&bytes[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().request_id, 1);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.request_id, 2);
        assert_eq!(second.error_code, 5);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let mut codec = PacketCodec::new();
        let mut tiny = BytesMut::from(&8u32.to_le_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut tiny),
            Err(CodecError::Protocol(ProtocolError::InvalidPacketLength(8)))
        ));

        let mut huge = BytesMut::from(&u32::MAX.to_le_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut huge),
            Err(CodecError::Protocol(ProtocolError::InvalidPacketLength(_)))
        ));
    }

    #[test]
    fn test_encoded_length_matches_declared_size() {
        let requests = [
            Request::Stop,
            Request::Continue,
            Request::Threads,
            Request::Stacktrace { thread_index: 2 },
        ];
        for (i, request) in requests.into_iter().enumerate() {
            let mut dst = BytesMut::new();
            let outgoing = OutgoingRequest {
                request_id: i as u32 + 1,
                request,
            };
            PacketCodec::new().encode(outgoing, &mut dst).unwrap();
            assert_eq!(dst.len(), request.kind().declared_size() as usize);
        }
    }

    #[test]
    fn test_encode_stacktrace_layout() {
        let mut dst = BytesMut::new();
        let outgoing = OutgoingRequest {
            request_id: 9,
            request: Request::Stacktrace { thread_index: 4 },
        };
        PacketCodec::new().encode(outgoing, &mut dst).unwrap();
        let mut buf = &dst[..];
        assert_eq!(buf.get_u32_le(), 16);
        assert_eq!(buf.get_u32_le(), 9);
        assert_eq!(buf.get_u32_le(), CommandKind::Stacktrace.code());
        assert_eq!(buf.get_u32_le(), 4);
    }
}
