//! Contracts for the ledger subscription transport.
//!
//! The transport itself (websocket framing, reconnects, ABI decoding)
//! lives outside this crate. Canopy consumes two narrow interfaces: a
//! subscription that can be told to re-deliver history from an
//! arbitrary block, and a head reader used purely for diagnostics.
//!
//! A subscription is an owned [`Subscription`] handle — whoever started
//! listening owns it and ends it explicitly. There is no process-wide
//! registry of active subscriptions.

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::event::RawEvent;

/// Transport error types.
#[derive(Debug, Snafu)]
pub enum TransportError {
    /// The subscription could not be established.
    #[snafu(display("subscribe to {event_name} failed: {message}"))]
    Subscribe {
        /// The event that was being subscribed to.
        event_name: String,
        /// Transport-specific description.
        message: String,
    },

    /// The ledger head could not be read.
    #[snafu(display("head block read failed: {message}"))]
    Head {
        /// Transport-specific description.
        message: String,
    },
}

/// Delivers decoded ledger events, at-least-once, from a given block
/// onward. Redelivery of already-persisted leaves is expected and
/// harmless.
pub trait LedgerTransport {
    /// Subscribes to `event_name`, replaying history from `from_block`
    /// (inclusive) before following the live ledger.
    fn subscribe(
        &self,
        event_name: &str,
        from_block: u64,
    ) -> Result<(Subscription, mpsc::Receiver<RawEvent>), TransportError>;
}

/// Reads the ledger's current head block. Diagnostics only — recovery
/// never derives the resume point from it.
pub trait HeadReader {
    /// The current head block number.
    fn head_block(&self) -> Result<u64, TransportError>;
}

/// Owned handle to one active event subscription.
///
/// Ends the subscription on [`Subscription::unsubscribe`] or on drop.
#[derive(Debug)]
pub struct Subscription {
    event_name: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// Wraps a stop channel handed out by a transport implementation.
    /// The transport side tears the subscription down when the channel
    /// fires or closes.
    pub fn new(event_name: impl Into<String>, stop: oneshot::Sender<()>) -> Self {
        Self { event_name: event_name.into(), stop: Some(stop) }
    }

    /// The event this subscription listens for.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Explicitly ends the subscription.
    pub fn unsubscribe(mut self) {
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            debug!(event_name = %self.event_name, "unsubscribing");
            let _ = stop.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
