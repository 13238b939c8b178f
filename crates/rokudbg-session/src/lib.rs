//! rokudbg Session - Interactive remote debugging of one reserved device
//!
//! This crate wires the codec to real I/O and the operator:
//! - `transport` - TCP connection, handshake and response polling
//! - `event` - the event bus merging log lines, operator input and packets
//! - `readers` - background readers for the log stream and stdin
//! - `command` - operator command parsing
//! - `session` - the `DebugSession` state machine and `run` entry point
//!
//! # Architecture
//!
//! ```text
//! log reader   ──Logging──▶ ┌───────────┐ ──send_command──▶ ┌────────┐
//!                           │ EventBus  │                   │ device │
//! input reader ──Input────▶ │ main loop │ ◀──next_message── │ :8081  │
//!                           └───────────┘                   └────────┘
//! ```
//!
//! Only the main loop reads or writes the debug socket.

pub mod command;
pub mod error;
pub mod event;
pub mod readers;
pub mod report;
pub mod session;
pub mod transport;

pub use command::OperatorCommand;
pub use error::{SessionError, TransportError};
pub use event::{Event, EventBus, EventSender};
pub use session::{run, DebugSession, Flow, InputOutcome, SessionPhase};
pub use transport::DebugTransport;
