//! End-to-end sessions over loopback TCP with a reserved device.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use common::{stop_info, FakeDevice};
use rokudbg_core::{
    Config, DeviceManager, LockRegistry, ReserveOptions, SessionSettings, StaticProbe,
};
use rokudbg_protocol::{PacketBuilder, ProtocolError, ProtocolVersion, Request, Update};
use rokudbg_session::{run, SessionError, TransportError};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

const CONFIG: &str = r#"
default_device = "loopback"

[devices.loopback]
ip = "127.0.0.1"
user = "rokudev"
password = "secret"
"#;

struct Harness {
    manager: DeviceManager,
    listener: TcpListener,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(CONFIG).unwrap();
        let locks = LockRegistry::with_identity(dir.path(), "e2e");
        let probe = Arc::new(StaticProbe::new(["127.0.0.1"]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self {
            manager: DeviceManager::with_locks(config, locks, probe),
            listener,
            dir,
        }
    }

    fn settings(&self) -> SessionSettings {
        SessionSettings {
            debug_port: self.listener.local_addr().unwrap().port(),
            connect_timeout_secs: 2,
            connect_retry_ms: 20,
        }
    }

    fn lock_exists(&self) -> bool {
        self.manager.locks().lock_path("loopback").exists()
    }

    /// Hands the listener to a scripted device task.
    fn device<F, Fut>(self, script: F) -> (DeviceManager, SessionSettings, JoinHandle<()>, TempDir)
    where
        F: FnOnce(FakeDevice<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let settings = self.settings();
        let listener = self.listener;
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            script(FakeDevice::new(stream)).await;
        });
        (self.manager, settings, handle, self.dir)
    }
}

fn no_input() -> Cursor<Vec<u8>> {
    Cursor::new(Vec::new())
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_session_auto_continues_and_releases_on_disconnect() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();
    assert!(harness.lock_exists());

    let (manager, settings, script, _dir) = harness.device(|mut fake| async move {
        fake.accept_handshake(ProtocolVersion::new(3, 1, 0)).await;
        let update = Update::AllThreadsStopped(stop_info(0));
        fake.send(PacketBuilder::update(&update).build()).await;
        assert_eq!(fake.next_request().await, (1, Request::Continue));
        fake.send(PacketBuilder::update(&update).build()).await;
        fake.expect_silence().await;
    });

    let err = run(&manager, device, &settings, no_input(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(TransportError::Closed)));
    script.await.unwrap();

    assert!(!manager.is_held("loopback"));
    assert!(!manager.locks().lock_path("loopback").exists());
}

#[tokio::test]
async fn test_operator_quit_ends_cleanly() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();

    let (manager, settings, script, _dir) = harness.device(|mut fake| async move {
        fake.accept_handshake(ProtocolVersion::new(3, 0, 0)).await;
        fake.wait_closed().await;
    });

    let input = Cursor::new(b"threads\nq\n".to_vec());
    run(&manager, device, &settings, input, CancellationToken::new())
        .await
        .unwrap();
    script.await.unwrap();
    assert!(!manager.locks().lock_path("loopback").exists());
}

#[tokio::test]
async fn test_unsupported_version_releases_device() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();

    let (manager, settings, script, _dir) = harness.device(|mut fake| async move {
        fake.accept_handshake(ProtocolVersion::new(4, 0, 0)).await;
    });

    let err = run(&manager, device, &settings, no_input(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Protocol(ProtocolError::UnsupportedVersion(_))
    ));
    script.await.unwrap();
    assert!(!manager.is_held("loopback"));
    assert!(!manager.locks().lock_path("loopback").exists());

    // Released cleanly, so the next reservation succeeds.
    manager.reserve(&ReserveOptions::named("loopback")).await.unwrap();
}

#[tokio::test]
async fn test_connect_ceiling_releases_device() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();
    let mut settings = harness.settings();
    settings.connect_timeout_secs = 1;
    let Harness {
        manager,
        listener,
        dir: _dir,
    } = harness;
    drop(listener);

    let err = run(&manager, device, &settings, no_input(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::ConnectTimeout { .. })
    ));
    assert!(!manager.locks().lock_path("loopback").exists());
}

#[tokio::test]
async fn test_cancel_during_session_releases_device() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let (manager, settings, script, _dir) = harness.device(|mut fake| async move {
        fake.accept_handshake(ProtocolVersion::new(3, 0, 0)).await;
        let update = Update::AllThreadsStopped(stop_info(0));
        fake.send(PacketBuilder::update(&update).build()).await;
        // The auto-continue only goes out once the handshake is done.
        assert_eq!(fake.next_request().await, (1, Request::Continue));
        trigger.cancel();
        fake.wait_closed().await;
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        run(&manager, device, &settings, no_input(), cancel),
    )
    .await
    .unwrap()
    .unwrap();
    script.await.unwrap();
    assert!(!manager.locks().lock_path("loopback").exists());
}

#[tokio::test]
async fn test_cancel_during_handshake_closes_connection() {
    let harness = Harness::new().await;
    let device = harness.manager.reserve(&ReserveOptions::any()).await.unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let (manager, settings, script, _dir) = harness.device(|mut fake| async move {
        fake.read_magic().await;
        trigger.cancel();
        fake.wait_closed().await;
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        run(&manager, device, &settings, no_input(), cancel),
    )
    .await
    .unwrap()
    .unwrap();
    script.await.unwrap();
    assert!(!manager.is_held("loopback"));
    assert!(!manager.locks().lock_path("loopback").exists());
}
