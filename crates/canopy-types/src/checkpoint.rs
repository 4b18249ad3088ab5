//! The ingestion progress checkpoint.
//!
//! Exactly one logical checkpoint exists per tree instance. It records
//! the most recently persisted leaf the checkpoint mechanism is aware
//! of, and nothing else — the leaves themselves are the source of
//! truth, the checkpoint only makes restart cheap.

use serde::{Deserialize, Serialize};

/// Identity of the most recently persisted leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestLeaf {
    /// Leaf index of the persisted leaf.
    pub leaf_index: u64,
    /// Block that emitted it.
    pub block_number: u64,
}

/// Singleton marker of ingestion progress.
///
/// A checkpoint with `latest_leaf: None` means the store has been
/// initialized but no leaf has been ingested yet; recovery then starts
/// from the configured genesis block. An entirely absent checkpoint is
/// a configuration error, not an empty tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The most recently persisted leaf, if any.
    pub latest_leaf: Option<LatestLeaf>,
}

impl Checkpoint {
    /// A checkpoint that has seen no leaves.
    pub fn empty() -> Self {
        Self { latest_leaf: None }
    }

    /// Whether `leaf_index` would advance this checkpoint.
    ///
    /// Concurrent ingestion may attempt advances out of order; the
    /// checkpoint only ever moves forward.
    pub fn would_advance(&self, leaf_index: u64) -> bool {
        match self.latest_leaf {
            None => true,
            Some(latest) => leaf_index > latest.leaf_index,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_checkpoint_advances_from_zero() {
        assert!(Checkpoint::empty().would_advance(0));
    }

    #[test]
    fn test_advance_is_strictly_monotonic() {
        let cp = Checkpoint { latest_leaf: Some(LatestLeaf { leaf_index: 5, block_number: 90 }) };
        assert!(!cp.would_advance(4));
        assert!(!cp.would_advance(5));
        assert!(cp.would_advance(6));
    }
}
