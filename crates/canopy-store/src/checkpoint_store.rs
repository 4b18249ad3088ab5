//! The singleton ingestion-progress checkpoint.
//!
//! One logical checkpoint exists per tree instance. There is no
//! in-memory cache: every read goes to the durable store, so a restart
//! always observes the last durably recorded value. Advances are
//! monotonic — concurrent, reordered advances can never move the
//! checkpoint backward.

use std::sync::Arc;

use canopy_types::checkpoint::{Checkpoint, LatestLeaf};
use canopy_types::codec;
use redb::{Database, ReadableTable};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::engine::StorageEngine;
use crate::error::{CodecSnafu, CommitSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::tables::Tables;

/// Checkpoint persistence over redb.
#[derive(Clone)]
pub struct CheckpointStore {
    db: Arc<Database>,
}

impl CheckpointStore {
    /// Creates a checkpoint store over the given engine.
    pub fn new(engine: &StorageEngine) -> Self {
        Self { db: engine.db() }
    }

    /// Writes the empty checkpoint if none exists. Idempotent.
    ///
    /// Initialization is the explicit precondition recovery depends on:
    /// an absent checkpoint means the store was never set up for this
    /// tree, which is different from a tree with no leaves yet.
    pub fn init(&self) -> Result<()> {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::CHECKPOINT).context(TableSnafu)?;
            if table.get(Tables::CHECKPOINT_KEY).context(StorageSnafu)?.is_none() {
                let encoded = codec::encode(&Checkpoint::empty()).context(CodecSnafu)?;
                table.insert(Tables::CHECKPOINT_KEY, encoded.as_slice()).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// Reads the checkpoint. `None` means the store was never
    /// initialized.
    pub fn get(&self) -> Result<Option<Checkpoint>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::CHECKPOINT).context(TableSnafu)?;
        match table.get(Tables::CHECKPOINT_KEY).context(StorageSnafu)? {
            Some(guard) => Ok(Some(codec::decode(guard.value()).context(CodecSnafu)?)),
            None => Ok(None),
        }
    }

    /// Advances the checkpoint to `(leaf_index, block_number)`.
    ///
    /// Returns whether the checkpoint moved. The read-modify-write runs
    /// inside one write transaction, and an advance to an index at or
    /// below the recorded one is a no-op, so out-of-order advances from
    /// concurrent ingestion are safe. Callers must only advance after
    /// the corresponding leaf is durably stored.
    ///
    /// # Errors
    ///
    /// Storage and codec faults surface as the corresponding
    /// `StoreError` variants.
    pub fn advance(&self, leaf_index: u64, block_number: u64) -> Result<bool> {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        let advanced = {
            let mut table = txn.open_table(Tables::CHECKPOINT).context(TableSnafu)?;
            let current = match table.get(Tables::CHECKPOINT_KEY).context(StorageSnafu)? {
                Some(guard) => codec::decode(guard.value()).context(CodecSnafu)?,
                None => {
                    // recovery enforces init() before ingestion starts,
                    // so an absent row here points at a misordered startup
                    warn!(leaf_index, "advancing a checkpoint that was never initialized");
                    Checkpoint::empty()
                }
            };
            if current.would_advance(leaf_index) {
                let next = Checkpoint {
                    latest_leaf: Some(LatestLeaf { leaf_index, block_number }),
                };
                let encoded = codec::encode(&next).context(CodecSnafu)?;
                table.insert(Tables::CHECKPOINT_KEY, encoded.as_slice()).context(StorageSnafu)?;
                true
            } else {
                false
            }
        };
        txn.commit().context(CommitSnafu)?;

        if advanced {
            debug!(leaf_index, block_number, "checkpoint advanced");
        }
        Ok(advanced)
    }
}
