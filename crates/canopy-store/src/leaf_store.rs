//! Idempotent leaf persistence and indexed reads.
//!
//! `insert` and `insert_many` are safe under at-least-once redelivery
//! and arbitrary reordering: a leaf index that is already present is
//! skipped and reported, never overwritten. Leaves have no update path
//! at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use canopy_types::codec;
use canopy_types::leaf::{LeafError, LeafRecord};
use canopy_types::tree::TreeLayout;
use canopy_types::value::{LeafValue, value_hex};
use redb::{Database, ReadableMultimapTable, ReadableTable, ReadableTableMetadata};
use snafu::ResultExt;
use tracing::debug;

use crate::engine::StorageEngine;
use crate::error::{
    CodecSnafu, CommitSnafu, EmptyStoreSnafu, Result, StorageSnafu, StoreError, TableSnafu,
    TransactionSnafu,
};
use crate::tables::Tables;

/// Leaf persistence over redb.
///
/// Cheap to clone; clones share the database handle and layout.
#[derive(Clone)]
pub struct LeafStore {
    db: Arc<Database>,
    layout: TreeLayout,
}

impl LeafStore {
    /// Creates a leaf store over the given engine.
    pub fn new(engine: &StorageEngine, layout: TreeLayout) -> Self {
        Self { db: engine.db(), layout }
    }

    /// The tree layout this store validates against.
    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Inserts a single leaf.
    ///
    /// Returns `Ok(true)` when the leaf was written, `Ok(false)` when a
    /// record with the same `leaf_index` already exists (the write is
    /// skipped — not an error and not an overwrite).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLeaf`] when the record's re-derived
    /// `node_index` disagrees with the stored one; nothing is written.
    /// Storage faults surface as the transaction-level variants.
    pub fn insert(&self, record: &LeafRecord) -> Result<bool> {
        self.validate(record)?;
        let encoded = codec::encode(record).context(CodecSnafu)?;

        let txn = self.db.begin_write().context(TransactionSnafu)?;
        let inserted = {
            let mut leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
            if leaves.get(record.leaf_index).context(StorageSnafu)?.is_some() {
                false
            } else {
                leaves
                    .insert(record.leaf_index, encoded.as_slice())
                    .context(StorageSnafu)?;
                let mut by_value =
                    txn.open_multimap_table(Tables::LEAF_VALUES).context(TableSnafu)?;
                by_value
                    .insert(record.value.as_slice(), record.leaf_index)
                    .context(StorageSnafu)?;
                true
            }
        };
        txn.commit().context(CommitSnafu)?;

        if inserted {
            debug!(
                leaf_index = record.leaf_index,
                block_number = record.block_number,
                value = %value_hex(&record.value),
                "leaf stored"
            );
        } else {
            debug!(leaf_index = record.leaf_index, "duplicate leaf ignored");
        }
        Ok(inserted)
    }

    /// Inserts a batch of leaves in one write transaction.
    ///
    /// Returns the number of records actually written; records whose
    /// `leaf_index` already exists are skipped individually, so partial
    /// success over a replayed batch is the normal case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLeaf`] if any record fails the
    /// node-index check; the whole batch aborts and nothing is
    /// committed.
    pub fn insert_many(&self, records: &[LeafRecord]) -> Result<usize> {
        for record in records {
            self.validate(record)?;
        }

        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            encoded.push(codec::encode(record).context(CodecSnafu)?);
        }

        let txn = self.db.begin_write().context(TransactionSnafu)?;
        let mut written = 0usize;
        {
            let mut leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
            let mut by_value = txn.open_multimap_table(Tables::LEAF_VALUES).context(TableSnafu)?;
            for (record, bytes) in records.iter().zip(&encoded) {
                if leaves.get(record.leaf_index).context(StorageSnafu)?.is_some() {
                    continue;
                }
                leaves.insert(record.leaf_index, bytes.as_slice()).context(StorageSnafu)?;
                by_value
                    .insert(record.value.as_slice(), record.leaf_index)
                    .context(StorageSnafu)?;
                written += 1;
            }
        }
        txn.commit().context(CommitSnafu)?;

        debug!(batch = records.len(), written, "leaf batch stored");
        Ok(written)
    }

    /// Gets a single leaf by its leaf index.
    pub fn get_by_index(&self, leaf_index: u64) -> Result<Option<LeafRecord>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        match leaves.get(leaf_index).context(StorageSnafu)? {
            Some(guard) => Ok(Some(codec::decode(guard.value()).context(CodecSnafu)?)),
            None => Ok(None),
        }
    }

    /// Gets many leaves by leaf index, ascending. Absent indices are
    /// silently omitted.
    pub fn get_by_indices(&self, leaf_indices: &[u64]) -> Result<Vec<LeafRecord>> {
        let wanted: BTreeSet<u64> = leaf_indices.iter().copied().collect();
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        let mut out = Vec::with_capacity(wanted.len());
        for leaf_index in wanted {
            if let Some(guard) = leaves.get(leaf_index).context(StorageSnafu)? {
                out.push(codec::decode(guard.value()).context(CodecSnafu)?);
            }
        }
        Ok(out)
    }

    /// Gets all leaves with `min_index <= leaf_index <= max_index`,
    /// ascending. Bounds are inclusive.
    pub fn get_by_index_range(&self, min_index: u64, max_index: u64) -> Result<Vec<LeafRecord>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        let mut out = Vec::new();
        for entry in leaves.range(min_index..=max_index).context(StorageSnafu)? {
            let (_, guard) = entry.context(StorageSnafu)?;
            out.push(codec::decode(guard.value()).context(CodecSnafu)?);
        }
        Ok(out)
    }

    /// Gets the leaves carrying a value, ascending by leaf index.
    ///
    /// Values are not guaranteed unique, so this may return several
    /// records.
    pub fn get_by_value(&self, value: &LeafValue) -> Result<Vec<LeafRecord>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let by_value = txn.open_multimap_table(Tables::LEAF_VALUES).context(TableSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;

        let mut out = Vec::new();
        for index in by_value.get(value.as_slice()).context(StorageSnafu)? {
            let leaf_index = index.context(StorageSnafu)?.value();
            if let Some(guard) = leaves.get(leaf_index).context(StorageSnafu)? {
                out.push(codec::decode(guard.value()).context(CodecSnafu)?);
            }
        }
        Ok(out)
    }

    /// Gets the leaves carrying any of the given values, ascending by
    /// leaf index.
    pub fn get_by_values(&self, values: &[LeafValue]) -> Result<Vec<LeafRecord>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let by_value = txn.open_multimap_table(Tables::LEAF_VALUES).context(TableSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;

        let mut indices = BTreeSet::new();
        for value in values {
            for index in by_value.get(value.as_slice()).context(StorageSnafu)? {
                indices.insert(index.context(StorageSnafu)?.value());
            }
        }

        let mut out = Vec::with_capacity(indices.len());
        for leaf_index in indices {
            if let Some(guard) = leaves.get(leaf_index).context(StorageSnafu)? {
                out.push(codec::decode(guard.value()).context(CodecSnafu)?);
            }
        }
        Ok(out)
    }

    /// Gets every stored leaf, ascending by leaf index.
    ///
    /// A full scan — expensive for large trees. Callers should prefer
    /// [`LeafStore::get_by_index_range`].
    pub fn all(&self) -> Result<Vec<LeafRecord>> {
        self.get_by_index_range(0, u64::MAX)
    }

    /// Gets every stored `(leaf_index, value)` pair, ascending.
    ///
    /// A full scan — expensive for large trees. Callers should prefer
    /// [`LeafStore::get_by_index_range`].
    pub fn all_values(&self) -> Result<Vec<(u64, LeafValue)>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        let mut out = Vec::new();
        for entry in leaves.range(0..=u64::MAX).context(StorageSnafu)? {
            let (key, guard) = entry.context(StorageSnafu)?;
            let record: LeafRecord = codec::decode(guard.value()).context(CodecSnafu)?;
            out.push((key.value(), record.value));
        }
        Ok(out)
    }

    /// Gets the leaf with the maximum leaf index, if any.
    pub fn latest(&self) -> Result<Option<LeafRecord>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        match leaves.last().context(StorageSnafu)? {
            Some((_, guard)) => Ok(Some(codec::decode(guard.value()).context(CodecSnafu)?)),
            None => Ok(None),
        }
    }

    /// Counts stored leaves. An estimate is acceptable by contract;
    /// redb happens to give an exact count.
    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        leaves.len().context(StorageSnafu)
    }

    /// The maximum stored leaf index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyStore`] when no leaves exist.
    pub fn max_index(&self) -> Result<u64> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;
        match leaves.last().context(StorageSnafu)? {
            Some((key, _)) => Ok(key.value()),
            None => EmptyStoreSnafu.fail(),
        }
    }

    /// Finds the leaf indices in `[start, end)` with no stored record,
    /// ascending. Reconciliation primitive, not a hot path.
    pub fn find_missing(&self, start: u64, end: u64) -> Result<Vec<u64>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let leaves = txn.open_table(Tables::LEAVES).context(TableSnafu)?;

        let mut missing = Vec::new();
        let mut next_expected = start;
        for entry in leaves.range(start..end).context(StorageSnafu)? {
            let (key, _) = entry.context(StorageSnafu)?;
            let present = key.value();
            missing.extend(next_expected..present);
            next_expected = present + 1;
        }
        missing.extend(next_expected..end);
        Ok(missing)
    }

    /// Re-derives the node index and rejects a record that disagrees
    /// with the layout (before any write happens).
    fn validate(&self, record: &LeafRecord) -> Result<()> {
        let expected = self
            .layout
            .node_index(record.leaf_index)
            .map_err(|source| StoreError::InvalidLeaf { source: LeafError::Layout { source } })?;
        if record.node_index != expected {
            return Err(StoreError::InvalidLeaf {
                source: LeafError::IndexMismatch {
                    leaf_index: record.leaf_index,
                    node_index: record.node_index,
                    expected,
                },
            });
        }
        Ok(())
    }
}
