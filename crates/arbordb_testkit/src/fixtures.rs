//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use crate::generators::DocOperation;
use arbordb_core::{
    Config, CoreResult, Database, DocEnumerator, DocRange, DocumentFlags, DocumentMeta,
    EnumeratorOptions, Retained,
};
use arbordb_storage::{MemoryEngine, StorageEngine};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database handle.
    pub db: Retained<Database>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::with_engine(Box::new(MemoryEngine::new()))
    }

    /// Creates a test database over a custom engine.
    pub fn with_engine(engine: Box<dyn StorageEngine>) -> Self {
        Self {
            db: Database::with_engine(engine, Config::default()),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        Self::file_with(Config::default().sync_on_commit(false))
    }

    /// Creates a new file-based test database with a custom configuration.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path().join("test.arbordb"), config)
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|d| d.path().join("test.arbordb"))
    }

    /// Closes the database and opens it again from disk.
    ///
    /// # Panics
    ///
    /// Panics for an in-memory database or if reopening fails.
    pub fn reopen(self, config: Config) -> Self {
        let path = self.path().expect("only file databases can be reopened");
        let Self { db, temp_dir } = self;
        db.close().expect("Failed to close database");
        drop(db);
        Self {
            db: Database::open(path, config).expect("Failed to reopen database"),
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Retained<Database>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Retained<Database>) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Retained<Database>, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Metadata for a plain first revision.
pub fn first_revision() -> DocumentMeta {
    DocumentMeta::new(DocumentFlags::NONE, &b"1-a"[..])
}

/// Writes documents with empty JSON bodies in one committed transaction.
pub fn put_committed(db: &Database, doc_ids: &[&str]) -> CoreResult<()> {
    db.begin_transaction()?;
    for doc_id in doc_ids {
        if let Err(e) = db.put(doc_id, &first_revision(), &b"{}"[..]) {
            db.end_transaction(false)?;
            return Err(e);
        }
    }
    db.end_transaction(true)
}

/// Applies operations in one transaction, committing if `commit` is true.
///
/// Purges of missing documents are skipped.
pub fn apply_operations(db: &Database, ops: &[DocOperation], commit: bool) -> CoreResult<()> {
    db.begin_transaction()?;
    for op in ops {
        let result = match op {
            DocOperation::Put { doc_id, body } => {
                db.put(doc_id, &first_revision(), body.clone())
            }
            DocOperation::Purge { doc_id } => match db.get(doc_id, false) {
                Ok(Some(_)) => db.purge(doc_id),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            db.end_transaction(false)?;
            return Err(e);
        }
    }
    db.end_transaction(commit)
}

/// IDs of every document a default enumeration yields, in order.
pub fn enumerate_ids(db: &Retained<Database>) -> CoreResult<Vec<String>> {
    let e = DocEnumerator::new(db, &DocRange::all(), EnumeratorOptions::default(), None)?;
    e.iter().map(|doc| doc.map(|doc| doc.doc_id)).collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database holding `count` documents `doc000`, `doc001`, ...
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let ids: Vec<String> = (0..count).map(|i| format!("doc{i:03}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        put_committed(&test_db, &refs).expect("Failed to populate database");
        test_db
    }
}
