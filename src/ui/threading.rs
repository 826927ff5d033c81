//! Threading helpers between the worker thread and the async front end.
//!
//! The worker is a plain OS thread. Results flow out through a bounded
//! tokio mpsc channel; stop requests flow in through a watch channel.

use crate::ui::WorkerEvent;
use crate::worker::Interruption;
use tokio::sync::{mpsc, watch};

/// Room for this many undelivered events before the worker blocks.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Wrapper for the channels of one worker run
pub struct WorkerBridge {
    /// Channel sender for worker events
    pub event_tx: mpsc::Sender<WorkerEvent>,

    /// Interruption signal (watch channel)
    pub cancel_tx: watch::Sender<bool>,

    /// Interruption receiver
    pub cancel_rx: watch::Receiver<bool>,
}

impl WorkerBridge {
    /// Create a new bridge with configured channel sizes
    pub fn new() -> (Self, mpsc::Receiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let bridge = Self {
            event_tx,
            cancel_tx,
            cancel_rx,
        };

        (bridge, event_rx)
    }

    /// Read side of the stop flag, for the worker.
    pub fn interruption(&self) -> Interruption {
        Interruption::new(self.cancel_rx.clone())
    }

    /// Ask the worker to stop after its current line or poll.
    pub fn request_interruption(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_interruption_requested(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}
