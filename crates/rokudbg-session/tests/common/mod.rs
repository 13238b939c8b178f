//! A scripted device for driving sessions in tests.

#![allow(dead_code)]

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rokudbg_protocol::builder::handshake_reply;
use rokudbg_protocol::handshake::{magic_bytes, MAGIC_LEN};
use rokudbg_protocol::{parse_request, ProtocolVersion, Request, StopInfo};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// How long a device waits for a request before failing the test
pub const REQUEST_WAIT: Duration = Duration::from_secs(2);

/// How long silence must last to count as "nothing sent"
pub const SILENCE: Duration = Duration::from_millis(100);

/// Revision timestamp sent in v3 handshakes (2023-11-14T22:13:20Z)
pub const REVISION_MS: i64 = 1_700_000_000_000;

pub struct FakeDevice<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> FakeDevice<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    /// Reads the client magic without answering.
    pub async fn read_magic(&mut self) {
        let mut magic = [0u8; MAGIC_LEN];
        self.stream.read_exact(&mut magic).await.unwrap();
        assert_eq!(magic, magic_bytes());
    }

    /// Reads the client magic and answers with `version` plus a trailer
    /// carrying a few extra bytes.
    pub async fn accept_handshake(&mut self, version: ProtocolVersion) {
        self.read_magic().await;
        let reply = handshake_reply(version, REVISION_MS, &[0xAA, 0xBB, 0xCC]);
        self.stream.write_all(&reply).await.unwrap();
    }

    pub async fn send(&mut self, packet: Bytes) {
        self.stream.write_all(&packet).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn next_request(&mut self) -> (u32, Request) {
        loop {
            if let Some(request) = parse_request(&mut self.buf).unwrap() {
                return request;
            }
            let read = timeout(REQUEST_WAIT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a request")
                .unwrap();
            assert!(read > 0, "client closed before sending a request");
        }
    }

    /// Asserts the client sends nothing for a short while.
    pub async fn expect_silence(&mut self) {
        assert!(parse_request(&mut self.buf).unwrap().is_none());
        if let Ok(read) = timeout(SILENCE, self.stream.read_buf(&mut self.buf)).await {
            let read = read.unwrap();
            assert_eq!(read, 0, "unexpected bytes from client: {:?}", &self.buf[..]);
        }
    }

    /// Waits until the client closes its side. A reset counts as closed.
    pub async fn wait_closed(&mut self) {
        loop {
            let read = timeout(REQUEST_WAIT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("client did not close");
            match read {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return,
                Err(e) => panic!("read failed while waiting for close: {e}"),
            }
        }
    }
}

pub fn stop_info(primary_thread_index: i32) -> StopInfo {
    StopInfo {
        primary_thread_index,
        stop_reason: 2,
        stop_reason_detail: "STOP statement".to_string(),
    }
}
