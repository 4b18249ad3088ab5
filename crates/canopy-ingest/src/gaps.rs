//! Read-side reconciliation: which expected leaves are missing.
//!
//! Never runs on the ingestion hot path and has no write side effects.
//! Callers use the report to drive audits or backfill.

use canopy_store::{LeafStore, StoreError};
use tracing::debug;

/// Missing-leaf report over an expected index range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapReport {
    /// Start of the expected range, inclusive.
    pub start: u64,
    /// End of the expected range, exclusive.
    pub end: u64,
    /// The indices in `[start, end)` with no stored leaf, ascending.
    pub missing: Vec<u64>,
}

impl GapReport {
    /// Whether the expected range is fully stored.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Detects holes in the stored leaf record.
#[derive(Clone)]
pub struct GapDetector {
    leaves: LeafStore,
}

impl GapDetector {
    /// Creates a detector over the given leaf store.
    pub fn new(leaves: LeafStore) -> Self {
        Self { leaves }
    }

    /// Reports the missing indices in `[start, end)`.
    pub fn scan(&self, start: u64, end: u64) -> Result<GapReport, StoreError> {
        let missing = self.leaves.find_missing(start, end)?;
        debug!(start, end, gaps = missing.len(), "gap scan finished");
        Ok(GapReport { start, end, missing })
    }

    /// Reports the missing indices assuming the ledger has emitted
    /// `expected_count` leaves in total.
    pub fn scan_expected(&self, expected_count: u64) -> Result<GapReport, StoreError> {
        self.scan(0, expected_count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use canopy_store::StorageEngine;
    use canopy_types::leaf::{LeafCandidate, LeafRecord};
    use canopy_types::tree::TreeLayout;

    use super::*;

    fn detector_with_leaves(indices: &[u64]) -> GapDetector {
        let engine = StorageEngine::in_memory().expect("engine");
        let layout = TreeLayout::new(8).expect("layout");
        let leaves = LeafStore::new(&engine, layout);
        for &leaf_index in indices {
            let record = LeafRecord::map(
                LeafCandidate {
                    value: [leaf_index as u8; 32],
                    leaf_index,
                    node_index: None,
                    block_number: 100,
                },
                &layout,
            )
            .expect("map");
            leaves.insert(&record).expect("insert");
        }
        GapDetector::new(leaves)
    }

    #[test]
    fn test_reports_single_hole() {
        let report = detector_with_leaves(&[0, 1, 3, 4]).scan(0, 5).unwrap();
        assert_eq!(report.missing, vec![2]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_empty_store_reports_entire_range() {
        let report = detector_with_leaves(&[]).scan_expected(5).unwrap();
        assert_eq!(report.missing, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_complete_range() {
        let report = detector_with_leaves(&[0, 1, 2]).scan_expected(3).unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn test_subrange_scan() {
        let report = detector_with_leaves(&[0, 1, 3, 4, 7]).scan(3, 7).unwrap();
        assert_eq!(report.missing, vec![5, 6]);
    }
}
