//! Table definitions for redb storage.
//!
//! Keys carry the domain meaning; values are postcard-encoded entities.

use redb::{MultimapTableDefinition, TableDefinition};

/// Table definitions for canopy storage.
pub struct Tables;

impl Tables {
    /// Leaf storage: `leaf_index` → serialized `LeafRecord`.
    ///
    /// The key is the unique leaf index; its uniqueness is what makes
    /// inserts idempotent under redelivery and reordering.
    pub const LEAVES: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("leaves");

    /// Value index: leaf value bytes → `leaf_index`.
    ///
    /// A multimap because values are not guaranteed unique. Maintained
    /// in the same write transaction as `LEAVES`.
    pub const LEAF_VALUES: MultimapTableDefinition<'static, &'static [u8], u64> =
        MultimapTableDefinition::new("leaf_values");

    /// Singleton checkpoint row, keyed by [`Tables::CHECKPOINT_KEY`].
    pub const CHECKPOINT: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("checkpoint");

    /// Key of the single checkpoint row.
    pub const CHECKPOINT_KEY: &'static str = "latest_leaf";
}
