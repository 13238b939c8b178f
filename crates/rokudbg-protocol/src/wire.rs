//! Field readers over one packet's body.
//!
//! Reads never cross the packet boundary: running out of body is a
//! `ShortRead`, and unread bytes are dropped with the packet.

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;

pub(crate) struct PacketReader {
    buf: Bytes,
}

impl PacketReader {
    pub(crate) fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(ProtocolError::ShortRead { needed, remaining });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len).to_vec())
    }

    /// NUL-terminated string. Invalid UTF-8 is replaced, not rejected.
    pub(crate) fn cstring(&mut self) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedString)?;
        let text = self.buf.split_to(end);
        self.buf.advance(1);
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// A u32 count followed by that many items.
    ///
    /// Capacity is bounded by the bytes left so a corrupt count cannot
    /// trigger a huge allocation.
    pub(crate) fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        let count = self.u32()? as usize;
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(item(self)?);
        }
        Ok(items)
    }
}
