//! redb storage engine wrapper.
//!
//! Provides a thin wrapper around redb with:
//! - Database lifecycle management (file-backed or in-memory)
//! - Table bootstrap, so read transactions never observe missing tables

use std::path::Path;
use std::sync::Arc;

use redb::Database;
use redb::backends::InMemoryBackend;
use snafu::ResultExt;
use tracing::info;

use crate::error::{CommitSnafu, OpenSnafu, Result, TableSnafu, TransactionSnafu};
use crate::tables::Tables;

/// Storage engine backed by redb.
///
/// Cheap to clone; all clones share the same database handle.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database>,
}

impl StorageEngine {
    /// Opens or creates a database file at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open` if the file cannot be created or
    /// opened as a database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db =
            Database::create(path).context(OpenSnafu { path: path.display().to_string() })?;
        let engine = Self { db: Arc::new(db) };
        engine.bootstrap_tables()?;
        info!(path = %path.display(), "opened leaf database");
        Ok(engine)
    }

    /// Creates an in-memory database. Used by tests.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context(OpenSnafu { path: ":memory:" })?;
        let engine = Self { db: Arc::new(db) };
        engine.bootstrap_tables()?;
        Ok(engine)
    }

    /// Gets a clone of the database handle.
    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Creates every table once, so later read transactions can open
    /// them even before the first write.
    fn bootstrap_tables(&self) -> Result<()> {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        {
            txn.open_table(Tables::LEAVES).context(TableSnafu)?;
            txn.open_multimap_table(Tables::LEAF_VALUES).context(TableSnafu)?;
            txn.open_table(Tables::CHECKPOINT).context(TableSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use redb::ReadableTableMetadata;

    use super::*;

    #[test]
    fn test_in_memory_engine_has_tables() {
        let engine = StorageEngine::in_memory().expect("should open");
        let db = engine.db();
        let txn = db.begin_read().expect("should begin read");
        let leaves = txn.open_table(Tables::LEAVES).expect("leaves table exists");
        assert_eq!(leaves.len().expect("len"), 0);
        txn.open_table(Tables::CHECKPOINT).expect("checkpoint table exists");
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("leaves.redb");
        {
            let _engine = StorageEngine::open(&path).expect("create");
        }
        let _engine = StorageEngine::open(&path).expect("reopen");
    }
}
