//! Debug connection to a device.
//!
//! Owns the socket, the read buffer and the request correlation state.
//! Generic over the stream so tests can drive it through
//! `tokio::io::duplex`.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use rokudbg_protocol::handshake::{
    check_magic, decode_version, magic_bytes, HandshakeTrailer, MAGIC_LEN, TRAILER_HEADER_LEN,
    VERSION_LEN,
};
use rokudbg_protocol::{
    Message, PacketCodec, ProtocolError, ProtocolSession, ProtocolVersion, Request,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

use crate::error::{SessionError, TransportError};

const READ_CHUNK: usize = 8192;

/// A connected debug socket and its protocol state.
pub struct DebugTransport<S = TcpStream> {
    stream: S,
    codec: PacketCodec,
    protocol: ProtocolSession,
    read_buf: BytesMut,
    write_buf: BytesMut,
    version: Option<ProtocolVersion>,
    unusable: bool,
}

impl DebugTransport<TcpStream> {
    /// Connects to `host:port`, retrying refused connections until
    /// `ceiling` has elapsed.
    ///
    /// The device's debug server only starts listening once the channel
    /// is launched, so a refusal right after reservation is expected.
    pub async fn connect(
        host: &str,
        port: u16,
        ceiling: Duration,
        retry: Duration,
    ) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let started = Instant::now();
        let deadline = started + ceiling;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match timeout(remaining, TcpStream::connect((host, port))).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            };

            match outcome {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    info!(addr = %addr, attempts, "Connected to debug server");
                    return Ok(Self::new(stream));
                }
                Err(e) if is_retryable(&e) => {
                    if Instant::now() + retry >= deadline {
                        return Err(TransportError::ConnectTimeout {
                            addr,
                            waited: started.elapsed(),
                        });
                    }
                    debug!(addr = %addr, attempts, error = %e, "Debug server not ready, retrying");
                    sleep(retry).await;
                }
                Err(source) => return Err(TransportError::Connect { addr, source }),
            }
        }
    }
}

fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
    )
}

impl<S> DebugTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream. The handshake has not run.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: PacketCodec::new(),
            protocol: ProtocolSession::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(64),
            version: None,
            unusable: false,
        }
    }

    /// Protocol version negotiated by the handshake.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Number of requests still waiting for a response.
    pub fn outstanding(&self) -> usize {
        self.protocol.outstanding_len()
    }

    /// Runs the handshake. Any failure leaves the transport unusable.
    pub async fn handshake(&mut self) -> Result<ProtocolVersion, SessionError> {
        if let Some(version) = self.version {
            return Ok(version);
        }
        match self.perform_handshake().await {
            Ok(version) => {
                self.version = Some(version);
                Ok(version)
            }
            Err(e) => {
                self.unusable = true;
                Err(e)
            }
        }
    }

    async fn perform_handshake(&mut self) -> Result<ProtocolVersion, SessionError> {
        self.stream.write_all(&magic_bytes()).await?;
        self.stream.flush().await?;

        let mut echo = [0u8; MAGIC_LEN];
        self.read_handshake(&mut echo).await?;
        check_magic(echo)?;

        let mut triple = [0u8; VERSION_LEN];
        self.read_handshake(&mut triple).await?;
        let version = decode_version(triple)?;

        if version.has_handshake_trailer() {
            let mut header = [0u8; TRAILER_HEADER_LEN];
            self.read_handshake(&mut header).await?;
            let trailer = HandshakeTrailer::decode(header)?;
            let mut extra = vec![0u8; trailer.extra_len()];
            self.read_handshake(&mut extra).await?;
            debug!(
                revision = ?trailer.revision_timestamp(),
                discarded = extra.len(),
                "Read handshake trailer"
            );
        }

        info!(version = %version, "Handshake complete");
        Ok(version)
    }

    async fn read_handshake(&mut self, buf: &mut [u8]) -> Result<(), SessionError> {
        match self.stream.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::ShortRead {
                needed: buf.len(),
                remaining: 0,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.version.is_none() {
            return Err(ProtocolError::HandshakeIncomplete.into());
        }
        if self.unusable {
            return Err(TransportError::Unusable.into());
        }
        Ok(())
    }

    /// Sends a command and returns the request id it went out under.
    pub async fn send_command(&mut self, request: Request) -> Result<u32, SessionError> {
        self.ensure_ready()?;
        let outgoing = self.protocol.prepare(request);

        self.write_buf.clear();
        self.codec.encode(outgoing, &mut self.write_buf)?;
        if let Err(e) = self.write_all().await {
            self.unusable = true;
            return Err(e.into());
        }

        debug!(
            request_id = outgoing.request_id,
            command = request.kind().name(),
            "Sent command"
        );
        Ok(outgoing.request_id)
    }

    async fn write_all(&mut self) -> io::Result<()> {
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await
    }

    /// Returns the next message if one can be had without waiting.
    ///
    /// Decodes an already buffered packet, or makes one read attempt
    /// that gives up immediately when the socket has nothing.
    pub async fn poll_response(&mut self) -> Result<Option<Message>, SessionError> {
        if let Some(message) = self.decode_buffered()? {
            return Ok(Some(message));
        }
        let attempt = tokio::select! {
            biased;
            read = self.stream.read_buf(&mut self.read_buf) => Some(read),
            _ = std::future::ready(()) => None,
        };
        match attempt {
            None => Ok(None),
            Some(Ok(0)) => Err(self.eof()),
            Some(Ok(_)) => self.decode_buffered(),
            Some(Err(e)) => Err(self.fail(e.into())),
        }
    }

    /// Waits for the next message. Cancel safe: bytes already read stay
    /// buffered for the next call.
    pub async fn next_message(&mut self) -> Result<Message, SessionError> {
        loop {
            if let Some(message) = self.decode_buffered()? {
                return Ok(message);
            }
            match self.stream.read_buf(&mut self.read_buf).await {
                Ok(0) => return Err(self.eof()),
                Ok(_) => {}
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    fn decode_buffered(&mut self) -> Result<Option<Message>, SessionError> {
        self.ensure_ready()?;
        let packet = match self.codec.decode(&mut self.read_buf) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.fail(e.into())),
        };
        match self.protocol.decode(packet) {
            Ok(message) => Ok(Some(message)),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    fn eof(&mut self) -> SessionError {
        let error = if self.read_buf.is_empty() {
            TransportError::Closed.into()
        } else {
            warn!(buffered = self.read_buf.len(), "Connection closed inside a packet");
            ProtocolError::ShortRead {
                needed: self.pending_frame_len(),
                remaining: self.read_buf.len(),
            }
            .into()
        };
        self.fail(error)
    }

    fn pending_frame_len(&self) -> usize {
        self.read_buf
            .get(..4)
            .and_then(|prefix| <[u8; 4]>::try_from(prefix).ok())
            .map_or(4, |prefix| u32::from_le_bytes(prefix) as usize)
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        self.unusable = true;
        error
    }

    /// Shuts the write half down. Errors are logged, not returned.
    pub async fn close(&mut self) {
        self.unusable = true;
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Error closing debug connection");
        }
    }
}
