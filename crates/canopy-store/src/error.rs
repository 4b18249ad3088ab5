//! Error types for the persistence layer.
//!
//! Duplicate-key outcomes never appear here: [`LeafStore::insert`]
//! reports them as `Ok(false)`. Everything else — transaction faults,
//! table faults, codec failures — surfaces unmodified; the store never
//! retries internally.
//!
//! [`LeafStore::insert`]: crate::LeafStore::insert

use canopy_types::codec::CodecError;
use canopy_types::leaf::LeafError;
use snafu::Snafu;

/// Unified result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Persistence error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Failed to open the database.
    #[snafu(display("failed to open database at {path}: {source}"))]
    Open {
        /// Path of the database file (`:memory:` for the in-memory backend).
        path: String,
        /// The underlying redb error.
        source: redb::DatabaseError,
    },

    /// Failed to begin a transaction.
    #[snafu(display("transaction failed: {source}"))]
    Transaction {
        /// The underlying redb error.
        source: redb::TransactionError,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// Failed to open a table.
    #[snafu(display("table operation failed: {source}"))]
    Table {
        /// The underlying redb error.
        source: redb::TableError,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// A read or write against table storage failed.
    #[snafu(display("storage operation failed: {source}"))]
    Storage {
        /// The underlying redb error.
        source: redb::StorageError,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// Failed to commit a write transaction.
    #[snafu(display("commit failed: {source}"))]
    Commit {
        /// The underlying redb error.
        source: redb::CommitError,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// A persisted record could not be encoded or decoded.
    #[snafu(display("codec failure: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
        /// Source code location for debugging.
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// A record failed leaf validation before any write happened.
    ///
    /// Covers node-index mismatches and out-of-capacity indices; a
    /// data-integrity class, fatal for the offending record.
    #[snafu(display("leaf rejected before persistence: {source}"))]
    InvalidLeaf {
        /// The underlying mapping error.
        source: LeafError,
    },

    /// A max-index query was issued against a store with zero leaves.
    #[snafu(display("no leaves stored"))]
    EmptyStore,
}
