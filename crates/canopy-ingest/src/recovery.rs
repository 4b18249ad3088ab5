//! Computing the block to resume the ledger subscription from.
//!
//! After a restart the subscriber must be pointed at a block early
//! enough that no leaf is ever skipped. The checkpoint records the last
//! *persisted* leaf, but writes complete out of order: a crash may have
//! persisted leaf `n` while an earlier leaf in the same batch was still
//! in flight. Resuming from the checkpoint's block alone could then
//! skip that earlier leaf forever.
//!
//! The coordinator therefore resumes from the first *gap*, not the last
//! checkpoint: it scans `[0, checkpoint.leaf_index)` for the lowest
//! missing index and, when one exists, resumes from the block of the
//! last stored leaf below it. Block numbers are non-decreasing in leaf
//! order and the resume point is inclusive, so the missing leaf is
//! guaranteed to be redelivered; leaves that were already stored replay
//! as free no-ops.

use canopy_store::{CheckpointStore, LeafStore, StoreError};
use canopy_types::checkpoint::LatestLeaf;
use canopy_types::config::TreeConfig;
use snafu::{ResultExt, Snafu};
use tracing::{info, warn};

use crate::transport::HeadReader;

/// Recovery error types.
#[derive(Debug, Snafu)]
pub enum RecoveryError {
    /// No checkpoint exists. The store must be initialized (with its
    /// genesis marker) before recovery runs; this is a configuration
    /// precondition, not a runtime condition to retry.
    #[snafu(display("no checkpoint found: the store was never initialized for this tree"))]
    UninitializedStore,

    /// A store read failed.
    #[snafu(display("recovery query failed: {source}"))]
    Query {
        /// The underlying store error.
        source: StoreError,
    },
}

/// Coordinator lifecycle: `Cold` until a resume point is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Process just started; resume point unknown.
    Cold,
    /// Resume point determined; ready to subscribe.
    Resumed,
}

/// Why the resume point is what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeBasis {
    /// No leaf ever ingested; starting from the configured genesis.
    Genesis,
    /// The stored record is contiguous; resuming from the checkpoint.
    Checkpoint,
    /// A hole was found below the checkpoint; resuming early enough to
    /// re-deliver it.
    GapRepair {
        /// The lowest missing leaf index.
        first_missing: u64,
    },
}

/// The computed subscription starting point. Inclusive: the transport
/// must re-deliver all events from `from_block` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Block to resume from, inclusive.
    pub from_block: u64,
    /// How the block was chosen.
    pub basis: ResumeBasis,
}

/// Determines, on startup, where the ledger subscription should resume.
pub struct RecoveryCoordinator {
    leaves: LeafStore,
    checkpoints: CheckpointStore,
    config: TreeConfig,
    state: RecoveryState,
}

impl RecoveryCoordinator {
    /// Creates a cold coordinator.
    pub fn new(leaves: LeafStore, checkpoints: CheckpointStore, config: TreeConfig) -> Self {
        Self { leaves, checkpoints, config, state: RecoveryState::Cold }
    }

    /// The coordinator's lifecycle state.
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Computes the block the subscription must resume from.
    ///
    /// The head reader is consulted only to report how far behind
    /// ingestion is; a head read failure is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::UninitializedStore`] when no checkpoint
    /// row exists at all; the process must not start ingesting.
    /// Store read failures surface as [`RecoveryError::Query`].
    pub fn compute_resume_block(
        &mut self,
        head: &impl HeadReader,
    ) -> Result<ResumePoint, RecoveryError> {
        let checkpoint =
            self.checkpoints.get().context(QuerySnafu)?.ok_or(RecoveryError::UninitializedStore)?;

        let resume = match checkpoint.latest_leaf {
            None => {
                info!(
                    genesis_block = self.config.genesis_block,
                    "no ingestion history; resuming from genesis"
                );
                ResumePoint { from_block: self.config.genesis_block, basis: ResumeBasis::Genesis }
            }
            Some(latest) => self.resume_from_history(latest)?,
        };

        match head.head_block() {
            Ok(head_block) => info!(
                from_block = resume.from_block,
                head_block,
                behind = head_block.saturating_sub(resume.from_block),
                "resume point computed"
            ),
            Err(error) => warn!(%error, "could not read ledger head for diagnostics"),
        }

        self.state = RecoveryState::Resumed;
        Ok(resume)
    }

    fn resume_from_history(&self, latest: LatestLeaf) -> Result<ResumePoint, RecoveryError> {
        let missing = self.leaves.find_missing(0, latest.leaf_index).context(QuerySnafu)?;

        let Some(&first_missing) = missing.first() else {
            return Ok(ResumePoint {
                from_block: latest.block_number,
                basis: ResumeBasis::Checkpoint,
            });
        };

        // Every index below the first gap is stored, so the leaf just
        // before it pins the latest block known to precede the gap.
        let from_block = if first_missing == 0 {
            self.config.genesis_block
        } else {
            match self.leaves.get_by_index(first_missing - 1).context(QuerySnafu)? {
                Some(prev) => prev.block_number,
                None => self.config.genesis_block,
            }
        };

        warn!(
            first_missing,
            gaps = missing.len(),
            from_block,
            "stored leaves are not contiguous; resuming before the first gap"
        );
        Ok(ResumePoint { from_block, basis: ResumeBasis::GapRepair { first_missing } })
    }
}
