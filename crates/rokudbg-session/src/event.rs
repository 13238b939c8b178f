//! The session event bus.
//!
//! An unbounded FIFO of tagged events. Producers push without blocking;
//! only the session main loop consumes. Events from one producer keep
//! their order, events from different producers interleave in arrival
//! order.

use rokudbg_protocol::Message;
use tokio::sync::mpsc;

/// Something the main loop must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One line from the device log stream
    Logging(String),
    /// One line of operator input
    Input(String),
    /// A decoded packet from the debug socket
    Socket(Message),
}

/// Producer handle. Cheap to clone; one per reader.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Pushes an event. Returns `false` once the bus is gone.
    pub fn push(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Consumer side, owned by the session.
#[derive(Debug)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Takes the next event if one is queued, without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next event. Cancel safe.
    ///
    /// The bus keeps a sender of its own, so this only completes with
    /// an event.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
