//! Background readers feeding the event bus.

use std::io::{self, BufRead};
use std::thread;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{Event, EventSender};

/// Reads operator lines on a plain thread.
///
/// Blocking reads on stdin cannot be cancelled, so the thread is never
/// joined; it ends on EOF, on a read error, or on the first push after
/// the bus is gone.
pub fn spawn_input_reader<R>(input: R, events: EventSender) -> io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Operator input failed");
                        break;
                    }
                };
                if !events.push(Event::Input(line)) {
                    break;
                }
            }
            debug!("Operator input closed");
        })
}

/// Streams newline-terminated lines from `stream` as `Logging` events
/// until EOF or cancellation.
pub fn spawn_log_reader<R>(stream: R, events: EventSender, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut line) => read,
            };
            match read {
                Ok(0) => {
                    debug!("Device log stream closed");
                    break;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end_matches(|c| c == '\n' || c == '\r').to_string();
                    if !events.push(Event::Logging(text)) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Device log stream failed");
                    break;
                }
            }
        }
    })
}

/// Connects to the device log port and streams it.
///
/// A failed connect is logged and the session carries on without device
/// logs.
pub fn spawn_log_stream(
    host: String,
    port: u16,
    events: EventSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let connect = tokio::select! {
            _ = cancel.cancelled() => return,
            connect = TcpStream::connect((host.as_str(), port)) => connect,
        };
        match connect {
            Ok(stream) => {
                info!(host = %host, port, "Attached to device log stream");
                if let Err(e) = spawn_log_reader(stream, events, cancel).await {
                    warn!(error = %e, "Device log reader panicked");
                }
            }
            Err(e) => warn!(host = %host, port, error = %e, "Failed to open device log stream"),
        }
    })
}
