//! The database handle.

use crate::config::{Config, EncryptionConfig};
use crate::document::{doc_key, Document, DocumentMeta};
use crate::error::{record_error, CoreError, CoreResult, ErrorRecord};
use crate::lifecycle::{RefCount, RefCounted, Retained};
use crate::stats::DatabaseStats;
use crate::sync::HandleLocks;
use crate::transaction::Transaction;
use crate::types::{SequenceNumber, TransactionId};
use arbordb_storage::{FileEngine, KeyRange, MemoryEngine, Record, StorageEngine, WriteOp};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, error, info};

/// State behind the data lock.
pub(crate) struct DbState {
    engine: Box<dyn StorageEngine>,
    open: bool,
}

impl DbState {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(CoreError::NotOpen)
        }
    }
}

/// A reference-counted handle to one open database.
///
/// The handle owns the storage engine and at most one open transaction.
/// Transactions nest: only the outermost [`begin_transaction`] creates a
/// storage transaction, and only the matching outermost
/// [`end_transaction`] commits or aborts it. While one thread owns the
/// transaction, `begin_transaction` on any other thread blocks until it is
/// closed.
///
/// Handles are created already retained, as [`Retained<Database>`].
///
/// # Example
///
/// ```rust
/// use arbordb_core::{Database, DocumentFlags, DocumentMeta};
///
/// let db = Database::open_in_memory().unwrap();
/// db.begin_transaction().unwrap();
/// db.put("doc1", &DocumentMeta::new(DocumentFlags::NONE, &b"1-a"[..]), &b"{}"[..])
///     .unwrap();
/// db.end_transaction(true).unwrap();
/// assert_eq!(db.document_count().unwrap(), 1);
/// ```
///
/// [`begin_transaction`]: Database::begin_transaction
/// [`end_transaction`]: Database::end_transaction
pub struct Database {
    refs: RefCount,
    locks: HandleLocks<DbState>,
    stats: DatabaseStats,
    config: Config,
    path: Option<PathBuf>,
    next_txn_id: AtomicU64,
}

impl RefCounted for Database {
    fn ref_count(&self) -> &RefCount {
        &self.refs
    }
}

impl Database {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened, another process
    /// holds it, or the encryption settings do not match the stored log.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Retained<Self>> {
        let path = path.as_ref();
        let engine = FileEngine::open(path, config.engine_options()?)?;
        info!(path = %path.display(), read_only = config.read_only, "opened database");
        Ok(Self::build(
            Box::new(engine),
            config,
            Some(path.to_path_buf()),
        ))
    }

    /// Creates an ephemeral database.
    ///
    /// # Errors
    ///
    /// Infallible today; kept fallible to match [`open`](Self::open).
    pub fn open_in_memory() -> CoreResult<Retained<Self>> {
        Ok(Self::with_engine(Box::new(MemoryEngine::new()), Config::default()))
    }

    /// Wraps an already opened engine.
    pub fn with_engine(engine: Box<dyn StorageEngine>, config: Config) -> Retained<Self> {
        Self::build(engine, config, None)
    }

    fn build(engine: Box<dyn StorageEngine>, config: Config, path: Option<PathBuf>) -> Retained<Self> {
        Retained::new(Self {
            refs: RefCount::new(),
            locks: HandleLocks::new(DbState { engine, open: true }),
            stats: DatabaseStats::new(),
            config,
            path,
            next_txn_id: AtomicU64::new(1),
        })
    }

    /// The configuration the handle was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The database directory. `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Operation counters.
    pub fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    /// Returns true until [`close`](Self::close) or
    /// [`delete_database`](Self::delete_database) succeeds.
    pub fn is_open(&self) -> bool {
        let gate = self.locks.gate();
        let data = gate.data();
        data.open
    }

    fn tracked<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // === Transactions ===

    /// Begins a transaction, or joins the one the calling thread already owns.
    ///
    /// Blocks while another thread owns an open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the engine refuses to start
    /// a transaction (read-only, busy).
    pub fn begin_transaction(&self) -> CoreResult<()> {
        let result = self.begin_inner();
        self.tracked(result)
    }

    fn begin_inner(&self) -> CoreResult<()> {
        let mut gate = self.locks.gate();
        gate.wait_for_turn();

        if gate.level > 0 {
            gate.level += 1;
            debug!(level = gate.level, "joined transaction");
            return Ok(());
        }

        let txn = {
            let mut data = gate.data();
            data.ensure_open()?;
            let batch = data.engine.begin_tx()?;
            let snapshot = SequenceNumber::new(data.engine.last_sequence());
            let id = TransactionId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
            Transaction::new(id, snapshot, batch)
        };

        debug!(txn = %txn.id(), snapshot = %txn.snapshot_seq(), "began transaction");
        gate.txn = Some(txn);
        gate.owner = Some(thread::current().id());
        gate.level = 1;
        self.stats.record_transaction_start();
        Ok(())
    }

    /// Ends one level of the current transaction.
    ///
    /// Inner ends only decrement the level; `commit == false` at any level
    /// dooms the transaction. When the level reaches zero the transaction is
    /// committed, or aborted if it was doomed.
    ///
    /// # Errors
    ///
    /// - `NotInTransaction` if the calling thread does not own a transaction
    /// - `TransactionAborted` if a commit was asked for but an inner end had
    ///   already aborted
    /// - storage errors from the commit itself; the transaction is closed
    ///   either way
    pub fn end_transaction(&self, commit: bool) -> CoreResult<()> {
        let result = self.end_inner(commit);
        self.tracked(result)
    }

    fn end_inner(&self, commit: bool) -> CoreResult<()> {
        let mut gate = self.locks.gate();
        if !gate.owned_by_current() {
            return Err(CoreError::NotInTransaction);
        }

        if !commit {
            if let Some(txn) = gate.txn.as_mut() {
                txn.doom();
            }
        }

        gate.level -= 1;
        if gate.level > 0 {
            debug!(level = gate.level, commit, "left nested transaction");
            return Ok(());
        }

        gate.owner = None;
        let Some(txn) = gate.txn.take() else {
            gate.notify_released();
            return Err(CoreError::unexpected("transaction level without a transaction"));
        };
        let id = txn.id();
        let doomed = txn.is_doomed();
        let writes = txn.write_count();

        let result = {
            let mut data = gate.data();
            if doomed {
                data.engine.abort_tx(txn.into_batch()).map_err(CoreError::from)
            } else {
                data.engine
                    .commit_tx(txn.into_batch())
                    .map(|_| ())
                    .map_err(CoreError::from)
            }
        };
        gate.notify_released();

        match (&result, doomed) {
            (Ok(()), false) => {
                debug!(txn = %id, writes, "committed transaction");
                self.stats.record_transaction_commit();
            }
            _ => {
                debug!(txn = %id, writes, commit, "aborted transaction");
                self.stats.record_transaction_abort();
            }
        }

        result?;
        if doomed && commit {
            return Err(CoreError::transaction_aborted(format!(
                "{id} was aborted by a nested end"
            )));
        }
        Ok(())
    }

    /// Returns true if any thread has a transaction open on this handle.
    pub fn is_in_transaction(&self) -> bool {
        self.locks.gate().level > 0
    }

    /// Current nesting level. Zero when idle.
    pub fn transaction_level(&self) -> u32 {
        self.locks.gate().level
    }

    /// Checks that the calling thread owns an open transaction.
    ///
    /// Fills `out` and returns false otherwise.
    pub fn must_be_in_transaction(&self, out: Option<&mut ErrorRecord>) -> bool {
        if self.locks.gate().owned_by_current() {
            return true;
        }
        record_error(&CoreError::NotInTransaction, out);
        false
    }

    /// Checks that no transaction is open on this handle.
    ///
    /// Fills `out` and returns false otherwise.
    pub fn must_not_be_in_transaction(&self, out: Option<&mut ErrorRecord>) -> bool {
        if self.locks.gate().level == 0 {
            return true;
        }
        record_error(&CoreError::TransactionNotClosed, out);
        false
    }

    /// ID of the transaction the calling thread owns.
    pub(crate) fn current_transaction_id(&self) -> Option<TransactionId> {
        self.locks.gate().current_txn().map(Transaction::id)
    }

    // === Documents ===

    /// Writes a document in the current transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotInTransaction` if the calling thread owns no transaction,
    /// or `InvalidParameter` for an empty document ID.
    pub fn put(&self, doc_id: &str, meta: &DocumentMeta, body: impl Into<Bytes>) -> CoreResult<()> {
        let result = self.put_inner(doc_id, meta, body.into());
        self.tracked(result)
    }

    fn put_inner(&self, doc_id: &str, meta: &DocumentMeta, body: Bytes) -> CoreResult<()> {
        if doc_id.is_empty() {
            return Err(CoreError::invalid_parameter("document ID is empty"));
        }
        let key = doc_key(doc_id)?.to_bytes();
        let meta = Bytes::from(meta.encode()?);

        let mut gate = self.locks.gate();
        let txn = gate.current_txn_mut().ok_or(CoreError::NotInTransaction)?;
        txn.put(key, meta, body);
        self.stats.record_write();
        Ok(())
    }

    /// Reads a document.
    ///
    /// Inside a transaction the calling thread sees its own uncommitted
    /// writes. Purged documents read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or stored data is unreadable.
    pub fn get(&self, doc_id: &str, with_body: bool) -> CoreResult<Option<Document>> {
        let result = self.get_inner(doc_id, with_body);
        self.tracked(result)
    }

    fn get_inner(&self, doc_id: &str, with_body: bool) -> CoreResult<Option<Document>> {
        let key = doc_key(doc_id)?.to_bytes();
        self.stats.record_read();

        let gate = self.locks.gate();
        let pending = gate.current_txn().and_then(|txn| txn.pending(&key)).cloned();
        let record = match pending {
            Some(op) => pending_record(key, op),
            None => {
                let data = gate.data();
                data.ensure_open()?;
                data.engine.get(&key)?
            }
        };
        drop(gate);

        match record {
            Some(record) if !record.tombstone => Ok(Some(Document::from_record(&record, with_body)?)),
            _ => Ok(None),
        }
    }

    /// Purges a document in the current transaction.
    ///
    /// The document disappears from reads and normal enumeration; its
    /// tombstone stays visible to privileged enumerations until
    /// [`compact`](Self::compact).
    ///
    /// # Errors
    ///
    /// Returns `NotInTransaction` outside a transaction owned by the calling
    /// thread, or `NotFound` if the document does not exist.
    pub fn purge(&self, doc_id: &str) -> CoreResult<()> {
        let result = self.purge_inner(doc_id);
        self.tracked(result)
    }

    fn purge_inner(&self, doc_id: &str) -> CoreResult<()> {
        let key = doc_key(doc_id)?.to_bytes();

        let mut gate = self.locks.gate();
        let pending = gate
            .current_txn()
            .ok_or(CoreError::NotInTransaction)?
            .pending(&key)
            .cloned();
        let exists = match pending {
            Some(WriteOp::Put { .. }) => true,
            Some(WriteOp::Purge) => false,
            None => {
                let data = gate.data();
                data.ensure_open()?;
                data.engine.get(&key)?.is_some_and(|r| !r.tombstone)
            }
        };
        if !exists {
            return Err(CoreError::not_found(doc_id));
        }

        let txn = gate.current_txn_mut().ok_or(CoreError::NotInTransaction)?;
        txn.purge(key);
        self.stats.record_purge();
        Ok(())
    }

    /// Number of committed, non-purged documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed.
    pub fn document_count(&self) -> CoreResult<usize> {
        let result = self.with_open_data(|data| Ok(data.engine.count()?));
        self.tracked(result)
    }

    /// Sequence of the most recent commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed.
    pub fn last_sequence(&self) -> CoreResult<SequenceNumber> {
        let result =
            self.with_open_data(|data| Ok(SequenceNumber::new(data.engine.last_sequence())));
        self.tracked(result)
    }

    fn with_open_data<T>(&self, f: impl FnOnce(&mut DbState) -> CoreResult<T>) -> CoreResult<T> {
        let gate = self.locks.gate();
        let mut data = gate.data();
        data.ensure_open()?;
        f(&mut data)
    }

    /// Records in `range` as the calling thread sees them: committed state
    /// overlaid with its own pending writes.
    pub(crate) fn visible_records(
        &self,
        range: &KeyRange,
        include_tombstones: bool,
    ) -> CoreResult<(Vec<Record>, Option<TransactionId>)> {
        let gate = self.locks.gate();
        let committed = {
            let data = gate.data();
            data.ensure_open()?;
            data.engine.scan(range, include_tombstones)?
        };
        let Some(txn) = gate.current_txn() else {
            return Ok((committed, None));
        };

        let mut merged: BTreeMap<Bytes, Record> =
            committed.into_iter().map(|r| (r.key.clone(), r)).collect();
        for (key, op) in txn.pending_writes().filter(|(key, _)| range.contains(key)) {
            match op {
                WriteOp::Put { .. } => {
                    if let Some(record) = pending_record(key.clone(), op.clone()) {
                        merged.insert(key.clone(), record);
                    }
                }
                WriteOp::Purge if include_tombstones => {
                    if let Some(record) = merged.get_mut(key) {
                        record.body = Bytes::new();
                        record.sequence = SequenceNumber::PENDING.as_u64();
                        record.tombstone = true;
                    }
                }
                WriteOp::Purge => {
                    merged.remove(key);
                }
            }
        }
        Ok((merged.into_values().collect(), Some(txn.id())))
    }

    /// Committed records changed after `since`, ordered by sequence.
    pub(crate) fn changed_records(&self, since: SequenceNumber) -> CoreResult<Vec<Record>> {
        self.with_open_data(|data| Ok(data.engine.changes_since(since.as_u64())?))
    }

    pub(crate) fn record_enumeration(&self) {
        self.stats.record_enumeration();
    }

    pub(crate) fn record_failure(&self) {
        self.stats.record_error();
    }

    // === Maintenance ===

    /// Closes the handle. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotClosed` while a transaction is open.
    pub fn close(&self) -> CoreResult<()> {
        let result = self.maintenance("close", |data| {
            if data.open {
                data.engine.close()?;
                data.open = false;
            }
            Ok(())
        });
        self.tracked(result)
    }

    /// Drops purged tombstones. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotClosed` while a transaction is open, or an error
    /// if the handle is closed or the rewrite fails.
    pub fn compact(&self) -> CoreResult<usize> {
        let result = self.maintenance("compact", |data| {
            data.ensure_open()?;
            let removed = data.engine.compact()?;
            info!(removed, "compacted database");
            Ok(removed)
        });
        self.tracked(result)
    }

    /// Re-seals stored data with new encryption settings.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotClosed` while a transaction is open, or an error
    /// if the settings are invalid or the rewrite fails.
    pub fn rekey(&self, encryption: &EncryptionConfig) -> CoreResult<()> {
        let result = self.maintenance("rekey", |data| {
            data.ensure_open()?;
            let key = encryption.storage_key()?;
            data.engine.rekey(key.as_ref())?;
            info!(algorithm = ?encryption.algorithm(), "rekeyed database");
            Ok(())
        });
        self.tracked(result)
    }

    /// Closes the handle and deletes everything it stored.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotClosed` while a transaction is open, or an error
    /// if files cannot be removed.
    pub fn delete_database(&self) -> CoreResult<()> {
        let result = self.maintenance("delete", |data| {
            data.engine.destroy()?;
            data.open = false;
            info!("deleted database");
            Ok(())
        });
        self.tracked(result)
    }

    fn maintenance<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut DbState) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let gate = self.locks.gate();
        if gate.level > 0 {
            debug!(operation, level = gate.level, "refused inside transaction");
            return Err(CoreError::TransactionNotClosed);
        }
        let mut data = gate.data();
        f(&mut data)
    }
}

/// The record a pending write will produce, or `None` for a pending purge.
fn pending_record(key: Bytes, op: WriteOp) -> Option<Record> {
    match op {
        WriteOp::Put { meta, body } => Some(Record {
            key,
            meta,
            body,
            sequence: SequenceNumber::PENDING.as_u64(),
            tombstone: false,
        }),
        WriteOp::Purge => None,
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let level = self.locks.level_for_teardown();
        if level != 0 {
            error!(level, "database handle destroyed inside a transaction");
            std::process::abort();
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("refs", &self.refs)
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
