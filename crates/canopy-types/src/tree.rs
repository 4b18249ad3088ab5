//! Flat-array layout of the append-only binary tree.
//!
//! The tree with height `h` is stored as a 0-based flat array in which
//! the `2^h` leaf slots occupy the tail, after the `2^h - 1` internal
//! nodes. A leaf's position in that array is therefore a pure function
//! of its leaf index:
//!
//! ```text
//! node_index(leaf_index) = leaf_index + 2^h - 1
//! ```
//!
//! Every component that touches a node index derives it through
//! [`TreeLayout`] so a corrupted index can never enter the store
//! unnoticed.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Maximum supported tree height. Keeps `2^h` and all node indices
/// comfortably inside `u64`.
pub const MAX_TREE_HEIGHT: u32 = 62;

/// Layout error types.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum LayoutError {
    /// The height is outside `1..=MAX_TREE_HEIGHT`.
    #[snafu(display("invalid tree height {height}: must be 1..={MAX_TREE_HEIGHT}"))]
    InvalidHeight {
        /// The rejected height.
        height: u32,
    },

    /// A leaf index beyond the tree's capacity.
    #[snafu(display("leaf index {leaf_index} exceeds tree capacity {capacity}"))]
    OutOfCapacity {
        /// The rejected leaf index.
        leaf_index: u64,
        /// Number of leaf slots in the tree.
        capacity: u64,
    },
}

/// Geometry of a fixed-height binary tree flattened into an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLayout {
    height: u32,
}

impl TreeLayout {
    /// Creates a layout for a tree of the given height.
    pub fn new(height: u32) -> Result<Self, LayoutError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(LayoutError::InvalidHeight { height });
        }
        Ok(Self { height })
    }

    /// The tree height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of leaf slots: `2^height`.
    pub fn leaf_capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Derives the flat-array node index for a leaf index.
    ///
    /// Strictly increasing in `leaf_index`. Fails with
    /// [`LayoutError::OutOfCapacity`] when the index does not fit the
    /// tree.
    pub fn node_index(&self, leaf_index: u64) -> Result<u64, LayoutError> {
        let capacity = self.leaf_capacity();
        if leaf_index >= capacity {
            return Err(LayoutError::OutOfCapacity { leaf_index, capacity });
        }
        Ok(leaf_index + capacity - 1)
    }
}
