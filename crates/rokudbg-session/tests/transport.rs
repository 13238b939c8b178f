//! Tests for the debug connection: connect, handshake and response
//! polling.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::time::{Duration, Instant};

use common::{stop_info, FakeDevice, REVISION_MS};
use rokudbg_protocol::builder::handshake_reply;
use rokudbg_protocol::{
    Message, PacketBuilder, ProtocolError, ProtocolVersion, Request, ResponseBody, Update,
    SUPPORTED_VERSIONS,
};
use rokudbg_session::{DebugTransport, SessionError, TransportError};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::time::sleep;

// ============================================================================
// Test Helpers
// ============================================================================

async fn handshake_with(
    version: ProtocolVersion,
) -> (
    Result<ProtocolVersion, SessionError>,
    DebugTransport<DuplexStream>,
    FakeDevice<DuplexStream>,
) {
    let (client, device) = duplex(64 * 1024);
    let mut transport = DebugTransport::new(client);
    let mut device = FakeDevice::new(device);
    let (result, ()) = tokio::join!(transport.handshake(), device.accept_handshake(version));
    (result, transport, device)
}

/// A loopback port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_supported_versions_complete() {
    for &version in SUPPORTED_VERSIONS {
        let (result, transport, _device) = handshake_with(version).await;
        assert_eq!(result.unwrap(), version);
        assert_eq!(transport.version(), Some(version));
    }
}

#[tokio::test]
async fn test_unsupported_version_leaves_transport_unusable() {
    let (result, mut transport, mut device) = handshake_with(ProtocolVersion::new(2, 1, 0)).await;
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::UnsupportedVersion(v)))
            if v == ProtocolVersion::new(2, 1, 0)
    ));
    assert_eq!(transport.version(), None);

    let err = transport.send_command(Request::Stop).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Protocol(ProtocolError::HandshakeIncomplete)
    ));
    device.expect_silence().await;
}

#[tokio::test]
async fn test_unprefixed_framing_revisions_rejected() {
    for version in [ProtocolVersion::new(2, 0, 0), ProtocolVersion::new(1, 0, 1)] {
        let (result, mut transport, _device) = handshake_with(version).await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::UnsupportedVersion(v))) if v == version
        ));
        let err = transport.next_message().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::HandshakeIncomplete)
        ));
    }
}

#[tokio::test]
async fn test_bad_magic_rejected() {
    let (client, mut device) = duplex(1024);
    let mut transport = DebugTransport::new(client);
    device.write_all(b"notdebug").await.unwrap();

    let err = transport.handshake().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Protocol(ProtocolError::BadMagic { .. })
    ));
}

#[tokio::test]
async fn test_truncated_trailer_is_short_read() {
    let (client, mut device) = duplex(1024);
    let mut transport = DebugTransport::new(client);
    let reply = handshake_reply(ProtocolVersion::new(3, 0, 0), REVISION_MS, &[1, 2, 3, 4]);
    device.write_all(&reply[..reply.len() - 2]).await.unwrap();
    drop(device);

    let err = transport.handshake().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Protocol(ProtocolError::ShortRead { .. })
    ));
}

#[tokio::test]
async fn test_trailer_bytes_do_not_leak_into_packets() {
    let (result, mut transport, mut device) = handshake_with(ProtocolVersion::new(3, 1, 0)).await;
    result.unwrap();

    let update = Update::AllThreadsStopped(stop_info(0));
    device.send(PacketBuilder::update(&update).build()).await;
    assert_eq!(transport.next_message().await.unwrap(), Message::Update(update));
}

// ============================================================================
// Polling
// ============================================================================

#[tokio::test]
async fn test_poll_response_then_next_message() {
    let (result, mut transport, mut device) = handshake_with(ProtocolVersion::new(3, 1, 0)).await;
    result.unwrap();
    assert!(transport.poll_response().await.unwrap().is_none());

    let threads_id = transport.send_command(Request::Threads).await.unwrap();
    let stop_id = transport.send_command(Request::Stop).await.unwrap();
    assert_eq!(device.next_request().await, (threads_id, Request::Threads));
    assert_eq!(device.next_request().await, (stop_id, Request::Stop));
    assert_eq!(transport.outstanding(), 2);

    // Answer out of order, both in one write.
    let mut batch = PacketBuilder::response(stop_id, &ResponseBody::Empty)
        .build()
        .to_vec();
    batch.extend_from_slice(&PacketBuilder::response(threads_id, &ResponseBody::Threads(vec![])).build());
    device.send(batch.into()).await;

    let first = transport.next_message().await.unwrap();
    let Message::Response(first) = first else {
        panic!("expected a response");
    };
    assert_eq!(first.request_id, stop_id);

    let second = transport.poll_response().await.unwrap().expect("buffered response");
    let Message::Response(second) = second else {
        panic!("expected a response");
    };
    assert_eq!(second.request_id, threads_id);
    assert_eq!(transport.outstanding(), 0);
    assert!(transport.poll_response().await.unwrap().is_none());
}

#[tokio::test]
async fn test_oversized_frame_is_fatal() {
    let (result, mut transport, mut device) = handshake_with(ProtocolVersion::new(3, 0, 0)).await;
    result.unwrap();

    device.send(bytes::Bytes::from_static(&[0xff, 0xff, 0xff, 0x7f, 0, 0, 0, 0])).await;
    let err = transport.next_message().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Protocol(ProtocolError::InvalidPacketLength(_))
    ));
    let err = transport.send_command(Request::Continue).await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(TransportError::Unusable)));
}

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_gives_up_after_ceiling() {
    let port = closed_port().await;
    let started = Instant::now();

    let err = DebugTransport::connect(
        "127.0.0.1",
        port,
        Duration::from_millis(300),
        Duration::from_millis(50),
    )
    .await
    .err()
    .expect("nothing is listening");

    assert!(matches!(err, TransportError::ConnectTimeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connect_retries_until_listener_appears() {
    let port = closed_port().await;

    let server = tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut magic = [0u8; 8];
        stream.read_exact(&mut magic).await.unwrap();
        stream
            .write_all(&handshake_reply(ProtocolVersion::new(3, 0, 0), 0, &[]))
            .await
            .unwrap();
    });

    let mut transport = DebugTransport::connect(
        "127.0.0.1",
        port,
        Duration::from_secs(5),
        Duration::from_millis(25),
    )
    .await
    .unwrap();
    assert_eq!(transport.handshake().await.unwrap(), ProtocolVersion::new(3, 0, 0));
    server.await.unwrap();
}
