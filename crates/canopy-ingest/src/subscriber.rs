//! Wiring the transport to the dispatcher.
//!
//! [`Ingestor::start`] subscribes to both leaf events from the resume
//! block and spawns one forwarding task per subscription. Each task
//! drains its event stream serially, but the dispatcher hands every
//! write off without waiting, so writes from consecutive events overlap
//! freely. A failed event is logged and the stream continues — the leaf
//! it carried will be caught by gap detection and the next recovery.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatcher::IngestionDispatcher;
use crate::event::{NEW_LEAF_EVENT, NEW_LEAVES_EVENT};
use crate::transport::{LedgerTransport, Subscription, TransportError};

/// Starts and owns the ingestion subscriptions.
pub struct Ingestor;

impl Ingestor {
    /// Subscribes to the leaf events from `from_block` (inclusive) and
    /// begins forwarding them to the dispatcher.
    pub fn start(
        transport: &impl LedgerTransport,
        dispatcher: IngestionDispatcher,
        from_block: u64,
    ) -> Result<IngestorHandle, TransportError> {
        let mut subscriptions = Vec::with_capacity(2);
        let mut tasks = Vec::with_capacity(2);

        for event_name in [NEW_LEAF_EVENT, NEW_LEAVES_EVENT] {
            let (subscription, mut events) = transport.subscribe(event_name, from_block)?;
            info!(event_name, from_block, "subscribed");

            let dispatcher = dispatcher.clone();
            let task = tokio::spawn(async move {
                while let Some(raw) = events.recv().await {
                    // tickets are intentionally dropped here; outcomes
                    // are observed through the supervisor channel
                    if let Err(error) = dispatcher.dispatch_raw(&raw) {
                        warn!(
                            event_name = %raw.name,
                            block_number = raw.block_number,
                            %error,
                            "event rejected before persistence"
                        );
                    }
                }
                info!(event_name, "event stream closed");
            });

            subscriptions.push(subscription);
            tasks.push(task);
        }

        Ok(IngestorHandle { subscriptions, tasks })
    }
}

/// Owned handle over the running subscriptions and forwarding tasks.
pub struct IngestorHandle {
    subscriptions: Vec<Subscription>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestorHandle {
    /// Unsubscribes from the ledger and waits for the forwarding tasks
    /// to drain. Writes already handed off still complete.
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        for task in self.tasks {
            // the task ends when the transport closes its channel
            let _ = task.await;
        }
    }
}
