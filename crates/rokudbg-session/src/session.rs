//! The interactive debug session.
//!
//! `DebugSession` is the only consumer of the event bus and the only
//! writer on the debug socket. Each `step` waits for whichever comes
//! first (a queued event, a decoded packet or cancellation) and handles
//! it to completion before the next one.

use std::fmt;
use std::io::BufRead;

use rokudbg_core::{Device, DeviceManager, SessionSettings};
use rokudbg_protocol::{
    CommandResult, Message, ProtocolVersion, Request, Response, ResponseBody, StopInfo,
    ThreadInfo, Update,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{OperatorCommand, HELP};
use crate::error::SessionError;
use crate::event::{Event, EventBus, EventSender};
use crate::readers;
use crate::report;
use crate::transport::DebugTransport;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket attached, handshake not started
    Connecting,
    Handshaking,
    Running,
    Stopped,
    Terminated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Whether the main loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What an operator line led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// A command went out under this request id
    Sent(u32),
    /// Local output only
    Shown,
    /// Warned about and dropped
    Rejected,
    Ignored,
    Quit,
}

pub struct DebugSession<S = TcpStream> {
    transport: DebugTransport<S>,
    events: EventBus,
    host: String,
    phase: SessionPhase,
    auto_continued: bool,
    threads: Option<Vec<ThreadInfo>>,
    last_stop: Option<StopInfo>,
    cancel: CancellationToken,
    log_cancel: CancellationToken,
    log_stream: Option<JoinHandle<()>>,
}

impl<S> DebugSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected transport. `host` is where the device log
    /// stream is opened once announced. The session stays `Connecting`
    /// until `handshake` is called.
    pub fn new(transport: DebugTransport<S>, host: impl Into<String>) -> Self {
        let cancel = CancellationToken::new();
        Self {
            transport,
            events: EventBus::new(),
            host: host.into(),
            phase: SessionPhase::Connecting,
            auto_continued: false,
            threads: None,
            last_stop: None,
            log_cancel: cancel.child_token(),
            cancel,
            log_stream: None,
        }
    }

    /// Ends the session when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.log_cancel = cancel.child_token();
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Producer handle for readers feeding this session.
    pub fn events(&self) -> EventSender {
        self.events.sender()
    }

    pub fn transport(&self) -> &DebugTransport<S> {
        &self.transport
    }

    /// Threads from the last listing, cleared on every continue.
    pub fn threads(&self) -> Option<&[ThreadInfo]> {
        self.threads.as_deref()
    }

    pub fn log_stream_active(&self) -> bool {
        self.log_stream
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Session state changed");
            self.phase = phase;
        }
    }

    pub async fn handshake(&mut self) -> Result<ProtocolVersion, SessionError> {
        self.set_phase(SessionPhase::Handshaking);
        match self.transport.handshake().await {
            Ok(version) => {
                self.set_phase(SessionPhase::Running);
                Ok(version)
            }
            Err(e) => {
                self.set_phase(SessionPhase::Terminated);
                Err(e)
            }
        }
    }

    /// Waits for the next event. `None` once the session is cancelled.
    pub async fn next_event(&mut self) -> Result<Option<Event>, SessionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            event = self.events.next() => Ok(event),
            message = self.transport.next_message() => Ok(Some(Event::Socket(message?))),
        }
    }

    /// Handles one event.
    pub async fn step(&mut self) -> Result<Flow, SessionError> {
        match self.next_event().await? {
            Some(event) => self.handle_event(event).await,
            None => {
                info!("Session cancelled");
                Ok(Flow::Quit)
            }
        }
    }

    /// Runs until quit, cancellation or a fatal error, then tears down.
    pub async fn run_loop(&mut self) -> Result<(), SessionError> {
        let result = loop {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.close().await;
        result
    }

    /// Stops the log stream and closes the debug socket.
    pub async fn close(&mut self) {
        self.set_phase(SessionPhase::Terminated);
        self.log_cancel.cancel();
        self.log_stream = None;
        self.transport.close().await;
    }

    pub async fn handle_event(&mut self, event: Event) -> Result<Flow, SessionError> {
        match event {
            Event::Logging(line) => {
                println!("{line}");
                Ok(Flow::Continue)
            }
            Event::Input(line) => match self.handle_input(&line).await? {
                InputOutcome::Quit => Ok(Flow::Quit),
                _ => Ok(Flow::Continue),
            },
            Event::Socket(message) => {
                self.handle_message(message).await?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn handle_message(&mut self, message: Message) -> Result<(), SessionError> {
        match message {
            Message::Update(update) => self.handle_update(update).await,
            Message::Response(response) => {
                self.handle_response(response);
                Ok(())
            }
        }
    }

    async fn handle_update(&mut self, update: Update) -> Result<(), SessionError> {
        match update {
            Update::LogPortOpened { port } => match u16::try_from(port) {
                Ok(port) => {
                    info!(port, "Device opened log port");
                    self.open_log_stream(port);
                }
                Err(_) => warn!(port, "Ignoring log port outside the TCP range"),
            },
            Update::AllThreadsStopped(info) => {
                println!("{}", report::stopped(&info));
                self.last_stop = Some(info);
                self.set_phase(SessionPhase::Stopped);
                if !self.auto_continued {
                    self.auto_continued = true;
                    info!("Resuming after initial stop");
                    self.resume().await?;
                }
            }
            Update::ThreadAttached(info) => {
                info!(
                    thread = info.primary_thread_index,
                    reason = info.stop_reason,
                    "Thread attached"
                );
            }
            Update::CompileErrors(errors) => {
                if errors.is_empty() {
                    debug!("Empty compile error report");
                } else {
                    println!("{}", report::compile_errors(&errors));
                }
            }
            Update::RuntimeError(error) => println!("{}", report::runtime_error(&error)),
            Update::Unknown { update_type } => debug!(update_type, "Ignoring unknown update"),
        }
        Ok(())
    }

    fn handle_response(&mut self, response: Response) {
        let command = response.command.name();
        match response.result {
            CommandResult::Ok(ResponseBody::Threads(threads)) => {
                print!("{}", report::thread_listing(&threads));
                self.threads = Some(threads);
            }
            CommandResult::Ok(ResponseBody::Stacktrace(frames)) => {
                print!("{}", report::stack_trace(&frames));
            }
            CommandResult::Ok(ResponseBody::Empty) => {
                debug!(request_id = response.request_id, command, "Command acknowledged");
            }
            CommandResult::Failed { error_code, detail } => {
                warn!(
                    request_id = response.request_id,
                    command,
                    error_code,
                    detail = %String::from_utf8_lossy(&detail),
                    "Command failed"
                );
            }
        }
    }

    fn open_log_stream(&mut self, port: u16) {
        if let Some(previous) = self.log_stream.take() {
            debug!("Replacing device log stream");
            previous.abort();
        }
        self.log_stream = Some(readers::spawn_log_stream(
            self.host.clone(),
            port,
            self.events.sender(),
            self.log_cancel.clone(),
        ));
    }

    /// Sends `continue` and forgets the thread listing.
    async fn resume(&mut self) -> Result<u32, SessionError> {
        let request_id = self.transport.send_command(Request::Continue).await?;
        self.threads = None;
        self.set_phase(SessionPhase::Running);
        Ok(request_id)
    }

    /// Handles one operator line.
    pub async fn handle_input(&mut self, line: &str) -> Result<InputOutcome, SessionError> {
        let outcome = match OperatorCommand::parse(line) {
            OperatorCommand::Stop => {
                InputOutcome::Sent(self.transport.send_command(Request::Stop).await?)
            }
            OperatorCommand::Continue => InputOutcome::Sent(self.resume().await?),
            OperatorCommand::Threads => {
                if self.phase != SessionPhase::Stopped {
                    return Ok(self.reject("threads"));
                }
                InputOutcome::Sent(self.transport.send_command(Request::Threads).await?)
            }
            OperatorCommand::Thread(index) => {
                match self.threads.as_ref().and_then(|threads| threads.get(index)) {
                    Some(thread) => {
                        println!("{}", report::thread_detail(index, thread));
                        InputOutcome::Shown
                    }
                    None => {
                        warn!(thread = index, "Unknown thread, run threads first");
                        InputOutcome::Rejected
                    }
                }
            }
            OperatorCommand::Stacktrace(index) => {
                if self.phase != SessionPhase::Stopped {
                    return Ok(self.reject("stacktrace"));
                }
                let thread_index = index.unwrap_or_else(|| self.primary_thread());
                let request = Request::Stacktrace { thread_index };
                InputOutcome::Sent(self.transport.send_command(request).await?)
            }
            OperatorCommand::Help => {
                println!("{HELP}");
                InputOutcome::Shown
            }
            OperatorCommand::Quit => InputOutcome::Quit,
            OperatorCommand::Empty => InputOutcome::Ignored,
            OperatorCommand::Unknown(command) => {
                warn!(command = %command, "Unknown command, try help");
                InputOutcome::Rejected
            }
        };
        Ok(outcome)
    }

    fn primary_thread(&self) -> u32 {
        self.last_stop
            .as_ref()
            .and_then(|info| u32::try_from(info.primary_thread_index).ok())
            .unwrap_or(0)
    }

    fn reject(&self, command: &str) -> InputOutcome {
        warn!(command, phase = %self.phase, "Must be stopped to use that command");
        InputOutcome::Rejected
    }
}

/// Releases the reservation on every exit path, unwinding included.
struct ReleaseGuard<'a> {
    manager: &'a DeviceManager,
    device: Device,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.device);
    }
}

/// Debugs a reserved device until the session ends, then releases it.
///
/// `input` supplies operator lines; it is read on a thread of its own.
pub async fn run<R>(
    manager: &DeviceManager,
    device: Device,
    settings: &SessionSettings,
    input: R,
    cancel: CancellationToken,
) -> Result<(), SessionError>
where
    R: BufRead + Send + 'static,
{
    let guard = ReleaseGuard { manager, device };
    let result = drive(&guard.device, settings, input, cancel).await;
    match &result {
        Ok(()) => info!(device = %guard.device.name(), "Debug session ended"),
        Err(e) => error!(device = %guard.device.name(), error = %e, "Debug session failed"),
    }
    result
}

async fn drive<R>(
    device: &Device,
    settings: &SessionSettings,
    input: R,
    cancel: CancellationToken,
) -> Result<(), SessionError>
where
    R: BufRead + Send + 'static,
{
    info!(
        device = %device,
        port = settings.debug_port,
        phase = %SessionPhase::Connecting,
        "Connecting to debug server"
    );
    let connect = DebugTransport::connect(
        device.ip(),
        settings.debug_port,
        settings.connect_timeout(),
        settings.connect_retry(),
    );
    let transport = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        transport = connect => transport?,
    };

    let mut session = DebugSession::new(transport, device.ip()).with_cancel(cancel.clone());
    let handshake = tokio::select! {
        _ = cancel.cancelled() => None,
        version = session.handshake() => Some(version),
    };
    let version = match handshake {
        Some(Ok(version)) => version,
        Some(Err(e)) => {
            session.close().await;
            return Err(e);
        }
        None => {
            info!(phase = %session.phase(), "Cancelled before the session started");
            session.close().await;
            return Ok(());
        }
    };
    println!("Connected to {} (protocol {version})", device.name());

    if let Err(e) = readers::spawn_input_reader(input, session.events()) {
        session.close().await;
        return Err(e.into());
    }
    session.run_loop().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(SessionPhase::Connecting.to_string(), "connecting");
        assert_eq!(SessionPhase::Stopped.to_string(), "stopped");
        assert_eq!(SessionPhase::Terminated.to_string(), "terminated");
    }
}
