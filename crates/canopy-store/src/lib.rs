//! Persistence layer for the canopy leaf ingestion service.
//!
//! Backed by redb. The leaves table's primary key (`leaf_index`) is the
//! sole idempotency and concurrency-safety mechanism for leaf writes:
//! duplicate inserts are detected inside a single write transaction and
//! reported as a boolean no-op, never as an error and never as an
//! overwrite.
//!
//! - [`StorageEngine`] — database lifecycle (file or in-memory)
//! - [`LeafStore`] — idempotent leaf writes and indexed reads
//! - [`CheckpointStore`] — the singleton ingestion-progress marker

#![deny(unsafe_code)]

mod checkpoint_store;
mod engine;
mod error;
mod leaf_store;
pub mod tables;

pub use checkpoint_store::CheckpointStore;
pub use engine::StorageEngine;
pub use error::{Result, StoreError};
pub use leaf_store::LeafStore;
