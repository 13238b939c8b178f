//! Device-side encoding.
//!
//! The inverse of the client codec: builds the packets a device sends and
//! parses the requests a client sends. Used by device simulators and by
//! tests on both sides of the wire.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::MIN_PACKET_LEN;
use crate::error::ProtocolError;
use crate::handshake::{magic_bytes, TRAILER_HEADER_LEN};
use crate::message::{CompileErrors, ResponseBody, RuntimeError, StopInfo, Update};
use crate::request::{CommandKind, Request};
use crate::version::ProtocolVersion;

/// Builds one incoming-direction packet with a correct length prefix.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    request_id: u32,
    error_code: u32,
    body: BytesMut,
}

impl PacketBuilder {
    /// Starts a packet with an explicit header.
    pub fn new(request_id: u32, error_code: u32) -> Self {
        Self {
            request_id,
            error_code,
            body: BytesMut::new(),
        }
    }

    /// Starts an unsolicited update of the given type.
    pub fn raw_update(update_type: u32) -> Self {
        Self::new(0, 0).u32(update_type)
    }

    /// Encodes a full update.
    pub fn update(update: &Update) -> Self {
        let builder = Self::raw_update(update.update_type());
        match update {
            Update::LogPortOpened { port } => builder.u32(*port),
            Update::AllThreadsStopped(info) | Update::ThreadAttached(info) => {
                builder.stop_info(info)
            }
            Update::CompileErrors(errors) => builder.compile_errors(errors),
            Update::RuntimeError(error) => builder.runtime_error(error),
            Update::Unknown { .. } => builder,
        }
    }

    /// Encodes a successful response.
    pub fn response(request_id: u32, body: &ResponseBody) -> Self {
        let builder = Self::new(request_id, 0);
        match body {
            ResponseBody::Empty => builder,
            ResponseBody::Threads(threads) => {
                let mut builder = builder.u32(threads.len() as u32);
                for thread in threads {
                    builder = builder
                        .u8(thread.flags)
                        .u32(thread.stop_reason)
                        .cstr(&thread.stop_reason_detail)
                        .u32(thread.line_number)
                        .cstr(&thread.function_name)
                        .cstr(&thread.file_path)
                        .cstr(&thread.code_snippet);
                }
                builder
            }
            ResponseBody::Stacktrace(frames) => {
                let mut builder = builder.u32(frames.len() as u32);
                for frame in frames {
                    builder = builder
                        .u32(frame.line_number)
                        .cstr(&frame.function_name)
                        .cstr(&frame.file_name);
                }
                builder
            }
        }
    }

    /// Encodes a failed response with its detail bytes.
    pub fn error_response(request_id: u32, error_code: u32, detail: &[u8]) -> Self {
        Self::new(request_id, error_code)
            .u32(detail.len() as u32)
            .bytes(detail)
    }

    fn stop_info(self, info: &StopInfo) -> Self {
        self.i32(info.primary_thread_index)
            .u8(info.stop_reason)
            .cstr(&info.stop_reason_detail)
    }

    fn compile_errors(self, errors: &CompileErrors) -> Self {
        self.u32(errors.flags)
            .u32(errors.breakpoint_id)
            .cstr_list(&errors.compile_errors)
            .cstr_list(&errors.runtime_errors)
            .cstr_list(&errors.other_errors)
    }

    fn runtime_error(self, error: &RuntimeError) -> Self {
        self.u32(error.flags)
            .cstr(&error.error_string)
            .cstr(&error.file_spec)
            .u32(error.line_number)
            .cstr(&error.library_name)
    }

    fn cstr_list(self, items: &[String]) -> Self {
        items
            .iter()
            .fold(self.u32(items.len() as u32), |builder, item| builder.cstr(item))
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.body.put_u8(value);
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.body.put_u32_le(value);
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.body.put_i32_le(value);
        self
    }

    pub fn cstr(mut self, value: &str) -> Self {
        self.body.put_slice(value.as_bytes());
        self.body.put_u8(0);
        self
    }

    /// Appends raw bytes, e.g. fields from a newer protocol revision.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.body.put_slice(value);
        self
    }

    /// Finishes the packet, prefixing its total length.
    pub fn build(self) -> Bytes {
        let total = MIN_PACKET_LEN + self.body.len();
        let mut out = BytesMut::with_capacity(total);
        out.put_u32_le(total as u32);
        out.put_u32_le(self.request_id);
        out.put_u32_le(self.error_code);
        out.put_slice(&self.body);
        out.freeze()
    }
}

/// Device half of the handshake: magic echo, version, and for major >= 3
/// the trailer with `extra` appended.
pub fn handshake_reply(version: ProtocolVersion, revision_timestamp_ms: i64, extra: &[u8]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(&magic_bytes());
    out.put_u32_le(version.major);
    out.put_u32_le(version.minor);
    out.put_u32_le(version.patch);
    if version.has_handshake_trailer() {
        out.put_u32_le((TRAILER_HEADER_LEN + extra.len()) as u32);
        out.put_i64_le(revision_timestamp_ms);
        out.put_slice(extra);
    }
    out.freeze()
}

/// Parses one client request from the front of `src`.
///
/// Returns `Ok(None)` until a whole request is buffered.
pub fn parse_request(src: &mut BytesMut) -> Result<Option<(u32, Request)>, ProtocolError> {
    if src.len() < 12 {
        return Ok(None);
    }
    let mut header = &src[..];
    let declared = header.get_u32_le();
    let request_id = header.get_u32_le();
    let code = header.get_u32_le();
    let kind = CommandKind::from_code(code).ok_or(ProtocolError::UnknownCommand(code))?;
    if declared != kind.declared_size() {
        return Err(ProtocolError::InvalidPacketLength(declared));
    }
    let declared = declared as usize;
    if src.len() < declared {
        return Ok(None);
    }

    let mut frame = src.split_to(declared);
    frame.advance(12);
    let request = match kind {
        CommandKind::Stop => Request::Stop,
        CommandKind::Continue => Request::Continue,
        CommandKind::Threads => Request::Threads,
        CommandKind::Stacktrace => Request::Stacktrace {
            thread_index: frame.get_u32_le(),
        },
    };
    Ok(Some((request_id, request)))
}
