//! Mapping ledger events to leaf records and handing off the writes.
//!
//! The dispatcher is called from the subscription delivery path, which
//! must never block on storage I/O. Mapping and validation run
//! synchronously — a record that fails integrity checks is rejected
//! before anything is spawned — and the store write itself runs on the
//! blocking pool. The caller receives an [`IngestTicket`] it may await
//! for the outcome; a supervisory channel, when installed, additionally
//! observes every asynchronous failure.
//!
//! Because each event's write is handed off independently, writes for
//! different events may interleave and complete out of order. That is
//! safe: the leaf store is idempotent per index, and the checkpoint is
//! only advanced after the leaves it summarizes are durably stored,
//! monotonically.

use canopy_store::{CheckpointStore, LeafStore, StoreError};
use canopy_types::leaf::{LeafError, LeafRecord};
use snafu::{ResultExt, Snafu};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::event::{DecodeError, LeafEvent, RawEvent};

/// Synchronous dispatch error types: the event never reached storage.
#[derive(Debug, Snafu)]
pub enum DispatchError {
    /// The raw event could not be decoded.
    #[snafu(display("event decode failed: {source}"))]
    Decode {
        /// The underlying decode error.
        source: DecodeError,
    },

    /// A candidate failed leaf validation (node-index mismatch or
    /// capacity overflow). Fatal for the event; nothing is persisted.
    #[snafu(display("event mapping failed: {source}"))]
    Map {
        /// The underlying mapping error.
        source: LeafError,
    },
}

/// Asynchronous ingestion error types, delivered through the ticket.
#[derive(Debug, Snafu)]
pub enum IngestError {
    /// The store write (or checkpoint advance) failed.
    #[snafu(display("leaf write failed: {source}"))]
    Store {
        /// The underlying store error.
        source: StoreError,
    },

    /// The write task was dropped before reporting an outcome.
    #[snafu(display("ingestion task dropped before completion"))]
    Cancelled,
}

/// Result of one event's write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Records newly written.
    pub inserted: usize,
    /// Records skipped because their leaf index already existed.
    pub duplicates: usize,
}

/// A failure report for the supervisory channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    /// Block of the event whose write failed.
    pub block_number: u64,
    /// First leaf index of the event.
    pub min_leaf_index: u64,
    /// Rendering of the error that stopped the write. The full error
    /// is delivered through the event's [`IngestTicket`].
    pub error: String,
}

/// Completion handle for one dispatched event.
///
/// Dropping the ticket is allowed — ingestion proceeds regardless; the
/// supervisory channel still sees failures.
#[derive(Debug)]
pub struct IngestTicket {
    rx: oneshot::Receiver<Result<IngestOutcome, IngestError>>,
}

impl IngestTicket {
    /// Waits for the event's write to finish.
    pub async fn wait(self) -> Result<IngestOutcome, IngestError> {
        self.rx.await.unwrap_or(Err(IngestError::Cancelled))
    }
}

/// Decodes ledger events into leaf records and forwards them to the
/// leaf store without blocking the event-delivery callback.
#[derive(Clone)]
pub struct IngestionDispatcher {
    leaves: LeafStore,
    checkpoints: CheckpointStore,
    supervisor: Option<mpsc::UnboundedSender<IngestFailure>>,
}

impl IngestionDispatcher {
    /// Creates a dispatcher over the given stores.
    pub fn new(leaves: LeafStore, checkpoints: CheckpointStore) -> Self {
        Self { leaves, checkpoints, supervisor: None }
    }

    /// Installs a channel that receives every asynchronous ingestion
    /// failure, for a supervisory layer to act on.
    pub fn with_supervisor(mut self, supervisor: mpsc::UnboundedSender<IngestFailure>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Decodes a raw transport event and dispatches it.
    ///
    /// Must be called within a tokio runtime.
    pub fn dispatch_raw(&self, raw: &RawEvent) -> Result<IngestTicket, DispatchError> {
        let event = LeafEvent::decode(raw).context(DecodeSnafu)?;
        self.dispatch(event)
    }

    /// Maps a decoded event to leaf records and hands the idempotent
    /// write off to the blocking pool.
    ///
    /// Validation failures return immediately and persist nothing.
    /// Must be called within a tokio runtime.
    pub fn dispatch(&self, event: LeafEvent) -> Result<IngestTicket, DispatchError> {
        let layout = *self.leaves.layout();
        let records = event
            .candidates()
            .context(DecodeSnafu)?
            .into_iter()
            .map(|candidate| LeafRecord::map(candidate, &layout))
            .collect::<Result<Vec<_>, _>>()
            .context(MapSnafu)?;

        let (tx, rx) = oneshot::channel();
        if records.is_empty() {
            // a batch event may legitimately carry zero values
            let _ = tx.send(Ok(IngestOutcome { inserted: 0, duplicates: 0 }));
            return Ok(IngestTicket { rx });
        }

        let min_leaf_index = records[0].leaf_index;
        let block_number = event.block_number();
        debug!(
            block_number,
            min_leaf_index,
            leaves = records.len(),
            "dispatching leaf write"
        );

        let leaves = self.leaves.clone();
        let checkpoints = self.checkpoints.clone();
        let supervisor = self.supervisor.clone();
        tokio::task::spawn_blocking(move || {
            let result = write_leaves(&leaves, &checkpoints, &records);
            if let Err(error) = &result {
                warn!(block_number, min_leaf_index, %error, "leaf ingestion failed");
                if let Some(supervisor) = supervisor {
                    let _ = supervisor.send(IngestFailure {
                        block_number,
                        min_leaf_index,
                        error: error.to_string(),
                    });
                }
            }
            let _ = tx.send(result);
        });

        Ok(IngestTicket { rx })
    }
}

/// Persists the mapped records, then advances the checkpoint to the
/// batch's highest leaf. The checkpoint must never outrun the data it
/// summarizes, so it moves only after the insert commits.
fn write_leaves(
    leaves: &LeafStore,
    checkpoints: &CheckpointStore,
    records: &[LeafRecord],
) -> Result<IngestOutcome, IngestError> {
    let inserted = match records {
        [single] => usize::from(leaves.insert(single).context(StoreSnafu)?),
        many => leaves.insert_many(many).context(StoreSnafu)?,
    };

    let last = &records[records.len() - 1];
    checkpoints.advance(last.leaf_index, last.block_number).context(StoreSnafu)?;

    Ok(IngestOutcome { inserted, duplicates: records.len() - inserted })
}
