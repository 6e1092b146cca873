//! Event Relay
//!
//! Forwards asynchronous backend events onto the control channel's
//! outbound queue. The relay is fire-and-forget: events arriving while
//! the channel is not active, or while the queue is full, are dropped
//! with a warning rather than buffered across connection epochs.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{BackendEvent, EventHandler};
use crate::infrastructure::channel::{ChannelState, Outbound};
use crate::infrastructure::metrics;

/// Relays backend events to the outbound queue.
pub struct EventRelay {
    state: Arc<ChannelState>,
    tx: mpsc::Sender<Outbound>,
}

impl EventRelay {
    /// Create a relay writing to the given outbound queue.
    #[must_use]
    pub fn new(state: Arc<ChannelState>, tx: mpsc::Sender<Outbound>) -> Self {
        Self { state, tx }
    }

    /// Build the handler closure registered with the execution backend.
    /// The backend may invoke it from any thread.
    #[must_use]
    pub fn handler(self: &Arc<Self>) -> EventHandler {
        let relay = Arc::clone(self);
        Arc::new(move |event| relay.forward(event))
    }

    fn forward(&self, event: BackendEvent) {
        if !self.state.is_active() {
            metrics::record_relay_dropped("inactive");
            tracing::warn!("Dropping backend event, control channel not active");
            return;
        }
        match self.tx.try_send(Outbound::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::record_relay_dropped("queue_full");
                tracing::warn!("Dropping backend event, outbound queue full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Outbound queue closed, dropping backend event");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
