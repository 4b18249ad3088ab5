//! The leaf entity and its mapping rules.
//!
//! A [`LeafRecord`] is immutable once stored: there is no update path
//! anywhere in canopy, and `is_locked` documents that structurally.
//! Records are only built through [`LeafRecord::map`], which derives or
//! cross-checks the node index against the tree layout so a record with
//! an inconsistent position can never reach persistence.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::tree::{LayoutError, TreeLayout};
use crate::value::LeafValue;

/// Leaf mapping error types.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum LeafError {
    /// A supplied node index disagrees with the one derived from the
    /// leaf index. Indicates a corrupted event or a broken layout and
    /// is fatal for the record.
    #[snafu(display(
        "node index {node_index} for leaf {leaf_index} should have been {expected}"
    ))]
    IndexMismatch {
        /// The leaf index of the offending record.
        leaf_index: u64,
        /// The node index the candidate carried.
        node_index: u64,
        /// The node index derived from the layout.
        expected: u64,
    },

    /// The leaf index does not fit the configured tree.
    #[snafu(display("leaf does not fit the tree: {source}"))]
    Layout {
        /// The underlying layout error.
        source: LayoutError,
    },
}

/// An unvalidated leaf as decoded from a ledger event.
///
/// `node_index` is optional: events normally omit it and the mapper
/// derives it. When it is present it is cross-checked, never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCandidate {
    /// Opaque leaf content.
    pub value: LeafValue,
    /// Dense index assigned by the ledger, starting at 0.
    pub leaf_index: u64,
    /// Claimed flat-array position, if the event carried one.
    pub node_index: Option<u64>,
    /// Ledger block that emitted the leaf.
    pub block_number: u64,
}

/// One immutable value originated by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    /// Opaque leaf content.
    pub value: LeafValue,
    /// Dense index assigned by the ledger. Unique across the store.
    pub leaf_index: u64,
    /// Flat-array position, always `layout.node_index(leaf_index)`.
    pub node_index: u64,
    /// Ledger block that emitted the leaf. Non-decreasing in leaf
    /// order, but several leaves may share a block.
    pub block_number: u64,
    /// Always `true`: leaves in an append-only tree never change.
    pub is_locked: bool,
}

impl LeafRecord {
    /// Maps a candidate into a record, deriving the node index when
    /// absent and cross-checking it when present.
    pub fn map(candidate: LeafCandidate, layout: &TreeLayout) -> Result<Self, LeafError> {
        let expected = layout
            .node_index(candidate.leaf_index)
            .map_err(|source| LeafError::Layout { source })?;

        let node_index = match candidate.node_index {
            None => expected,
            Some(claimed) if claimed == expected => claimed,
            Some(claimed) => {
                return Err(LeafError::IndexMismatch {
                    leaf_index: candidate.leaf_index,
                    node_index: claimed,
                    expected,
                });
            }
        };

        Ok(Self {
            value: candidate.value,
            leaf_index: candidate.leaf_index,
            node_index,
            block_number: candidate.block_number,
            is_locked: true,
        })
    }
}
