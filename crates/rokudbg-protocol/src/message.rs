//! Typed messages decoded from incoming packets.
//!
//! Packets with `request_id == 0` are unsolicited updates; all others
//! answer an outstanding request and are decoded according to the command
//! recorded for that id.

use crate::error::ProtocolError;
use crate::request::CommandKind;
use crate::wire::PacketReader;

// ============================================================================
// Top-level Message
// ============================================================================

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Update(Update),
    Response(Response),
}

// ============================================================================
// Unsolicited Updates
// ============================================================================

/// Server-initiated notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Type 1: the device opened a text log stream on this port
    LogPortOpened { port: u32 },

    /// Type 2: every thread is halted
    AllThreadsStopped(StopInfo),

    /// Type 3: a thread attached. Same payload as type 2
    ThreadAttached(StopInfo),

    /// Type 4: breakpoint hit and compile/runtime/other error summary
    CompileErrors(CompileErrors),

    /// Type 5: runtime error details
    RuntimeError(RuntimeError),

    /// A type newer than this client; the body is skipped
    Unknown { update_type: u32 },
}

impl Update {
    pub const LOG_PORT_OPENED: u32 = 1;
    pub const ALL_THREADS_STOPPED: u32 = 2;
    pub const THREAD_ATTACHED: u32 = 3;
    pub const COMPILE_ERRORS: u32 = 4;
    pub const RUNTIME_ERROR: u32 = 5;

    /// Wire value of the `update_type` field.
    pub fn update_type(&self) -> u32 {
        match self {
            Self::LogPortOpened { .. } => Self::LOG_PORT_OPENED,
            Self::AllThreadsStopped(_) => Self::ALL_THREADS_STOPPED,
            Self::ThreadAttached(_) => Self::THREAD_ATTACHED,
            Self::CompileErrors(_) => Self::COMPILE_ERRORS,
            Self::RuntimeError(_) => Self::RUNTIME_ERROR,
            Self::Unknown { update_type } => *update_type,
        }
    }

    pub(crate) fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        let update_type = body.u32()?;
        let update = match update_type {
            0 => return Err(ProtocolError::UndefinedUpdateType),
            Self::LOG_PORT_OPENED => Self::LogPortOpened { port: body.u32()? },
            Self::ALL_THREADS_STOPPED => Self::AllThreadsStopped(StopInfo::decode(body)?),
            Self::THREAD_ATTACHED => Self::ThreadAttached(StopInfo::decode(body)?),
            Self::COMPILE_ERRORS => Self::CompileErrors(CompileErrors::decode(body)?),
            Self::RUNTIME_ERROR => Self::RuntimeError(RuntimeError::decode(body)?),
            other => Self::Unknown { update_type: other },
        };
        Ok(update)
    }
}

/// Why and where execution halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    pub primary_thread_index: i32,
    pub stop_reason: u8,
    pub stop_reason_detail: String,
}

impl StopInfo {
    fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            primary_thread_index: body.i32()?,
            stop_reason: body.u8()?,
            stop_reason_detail: body.cstring()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileErrors {
    pub flags: u32,
    pub breakpoint_id: u32,
    pub compile_errors: Vec<String>,
    pub runtime_errors: Vec<String>,
    pub other_errors: Vec<String>,
}

impl CompileErrors {
    fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            flags: body.u32()?,
            breakpoint_id: body.u32()?,
            compile_errors: body.list(PacketReader::cstring)?,
            runtime_errors: body.list(PacketReader::cstring)?,
            other_errors: body.list(PacketReader::cstring)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.compile_errors.is_empty() && self.runtime_errors.is_empty() && self.other_errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub flags: u32,
    pub error_string: String,
    pub file_spec: String,
    pub line_number: u32,
    pub library_name: String,
}

impl RuntimeError {
    fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            flags: body.u32()?,
            error_string: body.cstring()?,
            file_spec: body.cstring()?,
            line_number: body.u32()?,
            library_name: body.cstring()?,
        })
    }
}

// ============================================================================
// Command Responses
// ============================================================================

/// Answer to a previously sent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request_id: u32,
    pub command: CommandKind,
    pub result: CommandResult,
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok(ResponseBody),
    /// Non-zero error code; the device sends detail bytes and no body
    Failed { error_code: u32, detail: Vec<u8> },
}

/// Command-specific success payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// `stop` and `continue` carry nothing
    Empty,
    Threads(Vec<ThreadInfo>),
    Stacktrace(Vec<StackFrame>),
}

impl ResponseBody {
    pub(crate) fn decode(command: CommandKind, body: &mut PacketReader) -> Result<Self, ProtocolError> {
        let decoded = match command {
            CommandKind::Stop | CommandKind::Continue => Self::Empty,
            CommandKind::Threads => Self::Threads(body.list(ThreadInfo::decode)?),
            CommandKind::Stacktrace => Self::Stacktrace(body.list(StackFrame::decode)?),
        };
        Ok(decoded)
    }
}

impl CommandResult {
    pub(crate) fn decode(
        command: CommandKind,
        error_code: u32,
        body: &mut PacketReader,
    ) -> Result<Self, ProtocolError> {
        if error_code != 0 {
            let len = body.u32()? as usize;
            return Ok(Self::Failed {
                error_code,
                detail: body.bytes(len)?,
            });
        }
        Ok(Self::Ok(ResponseBody::decode(command, body)?))
    }
}

/// One entry of a `threads` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub flags: u8,
    pub stop_reason: u32,
    pub stop_reason_detail: String,
    pub line_number: u32,
    pub function_name: String,
    pub file_path: String,
    pub code_snippet: String,
}

impl ThreadInfo {
    fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            flags: body.u8()?,
            stop_reason: body.u32()?,
            stop_reason_detail: body.cstring()?,
            line_number: body.u32()?,
            function_name: body.cstring()?,
            file_path: body.cstring()?,
            code_snippet: body.cstring()?,
        })
    }
}

/// One entry of a `stacktrace` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub line_number: u32,
    pub function_name: String,
    pub file_name: String,
}

impl StackFrame {
    fn decode(body: &mut PacketReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            line_number: body.u32()?,
            function_name: body.cstring()?,
            file_name: body.cstring()?,
        })
    }
}
