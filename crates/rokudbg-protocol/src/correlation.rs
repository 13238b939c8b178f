//! Request ids and response matching.

use std::collections::HashMap;

use tracing::debug;

use crate::codec::Packet;
use crate::error::ProtocolError;
use crate::message::{CommandResult, Message, Response, Update};
use crate::request::{CommandKind, OutgoingRequest, Request};
use crate::wire::PacketReader;

/// Correlation state for one debug connection.
///
/// Request ids start at 1 and increase by one per command. Each id is
/// recorded before its bytes are written, so a response can be matched
/// whatever else arrives first.
#[derive(Debug)]
pub struct ProtocolSession {
    next_request_id: u32,
    outstanding: HashMap<u32, CommandKind>,
}

impl Default for ProtocolSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolSession {
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            outstanding: HashMap::new(),
        }
    }

    /// Id the next prepared request will carry.
    pub fn next_request_id(&self) -> u32 {
        self.next_request_id
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, request_id: u32) -> bool {
        self.outstanding.contains_key(&request_id)
    }

    /// Assigns an id to a request and records it as outstanding.
    pub fn prepare(&mut self, request: Request) -> OutgoingRequest {
        let request_id = self.next_request_id;
        // Id 0 is reserved for updates, so skip it on wrap-around
        self.next_request_id = self.next_request_id.checked_add(1).unwrap_or(1);
        self.outstanding.insert(request_id, request.kind());
        OutgoingRequest {
            request_id,
            request,
        }
    }

    /// Interprets a framed packet.
    ///
    /// Matched requests are removed from the outstanding table. Fields
    /// beyond those this client knows are skipped.
    ///
    /// # Errors
    ///
    /// * `ProtocolError::UnknownRequestId` - the id is neither 0 nor outstanding
    /// * `ProtocolError::UndefinedUpdateType` - an update of type 0
    /// * `ProtocolError::ShortRead` / `UnterminatedString` - known fields
    ///   overrun the declared length
    pub fn decode(&mut self, packet: Packet) -> Result<Message, ProtocolError> {
        let request_id = packet.request_id;
        let mut body = PacketReader::new(packet.body);

        let message = if request_id == 0 {
            Message::Update(Update::decode(&mut body)?)
        } else if let Some(command) = self.outstanding.remove(&request_id) {
            let result = CommandResult::decode(command, packet.error_code, &mut body)?;
            Message::Response(Response {
                request_id,
                command,
                result,
            })
        } else {
            return Err(ProtocolError::UnknownRequestId(request_id));
        };

        if body.remaining() > 0 {
            debug!(
                request_id,
                skipped = body.remaining(),
                "Skipping unknown trailing fields"
            );
        }
        Ok(message)
    }
}
