//! Storage engine trait definition.

use crate::batch::WriteBatch;
use crate::crypto::EncryptionKey;
use crate::error::StorageResult;
use bytes::Bytes;
use std::ops::Bound;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record key.
    pub key: Bytes,
    /// Opaque metadata, kept across purges.
    pub meta: Bytes,
    /// Opaque body. Empty for tombstones.
    pub body: Bytes,
    /// Sequence number of the commit that last touched the record.
    pub sequence: u64,
    /// True if the record was purged and is only a tombstone.
    pub tombstone: bool,
}

/// A range of keys for [`StorageEngine::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound.
    pub start: Bound<Bytes>,
    /// Upper bound.
    pub end: Bound<Bytes>,
}

impl KeyRange {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// A range with explicit bounds.
    #[must_use]
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// Returns true if the range cannot contain any key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// Returns true if `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above = match &self.start {
            Bound::Included(s) => key >= s.as_ref(),
            Bound::Excluded(s) => key > s.as_ref(),
            Bound::Unbounded => true,
        };
        let below = match &self.end {
            Bound::Included(e) => key <= e.as_ref(),
            Bound::Excluded(e) => key < e.as_ref(),
            Bound::Unbounded => true,
        };
        above && below
    }

    pub(crate) fn as_slices(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_slice(&self.start), as_slice(&self.end))
    }
}

fn as_slice(bound: &Bound<Bytes>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_ref()),
        Bound::Excluded(b) => Bound::Excluded(b.as_ref()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// A key-ordered record store with atomic batch commits.
///
/// Engines know nothing about documents or key encodings: keys, metadata and
/// bodies are opaque bytes. Keys are compared as unsigned bytes.
///
/// # Invariants
///
/// - At most one storage transaction is open at a time
/// - `commit_tx` applies a whole batch or nothing
/// - Every record touched by a commit gets a fresh, increasing sequence
/// - Tombstones persist until `compact`
///
/// # Implementors
///
/// - [`crate::MemoryEngine`] - ephemeral, for tests and in-memory databases
/// - [`crate::FileEngine`] - append-only commit log on disk
pub trait StorageEngine: Send {
    /// Reads one record, including tombstones.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Record>>;

    /// Returns the records in `range` in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed.
    fn scan(&self, range: &KeyRange, include_tombstones: bool) -> StorageResult<Vec<Record>>;

    /// Returns every record changed after `since`, ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed.
    fn changes_since(&self, since: u64) -> StorageResult<Vec<Record>>;

    /// Number of live (non-tombstone) records.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed.
    fn count(&self) -> StorageResult<usize>;

    /// Sequence number of the most recent commit.
    fn last_sequence(&self) -> u64;

    /// Opens a storage transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open, or if the engine is
    /// closed or read-only.
    fn begin_tx(&mut self) -> StorageResult<WriteBatch>;

    /// Applies a batch atomically and returns the new last sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is not the open transaction or the
    /// commit could not be made durable. Nothing is applied on error.
    fn commit_tx(&mut self, batch: WriteBatch) -> StorageResult<u64>;

    /// Discards a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is not the open transaction.
    fn abort_tx(&mut self, batch: WriteBatch) -> StorageResult<()>;

    /// Drops tombstones. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is open or the rewrite fails.
    fn compact(&mut self) -> StorageResult<usize>;

    /// Re-seals stored data under a new key, or removes encryption with `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is open or the rewrite fails.
    fn rekey(&mut self, key: Option<&EncryptionKey>) -> StorageResult<()>;

    /// Releases files and locks. Further calls fail with `Closed`.
    ///
    /// # Errors
    ///
    /// Returns an error if pending data cannot be flushed.
    fn close(&mut self) -> StorageResult<()>;

    /// Closes the engine and removes everything it stored.
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be removed.
    fn destroy(&mut self) -> StorageResult<()>;
}
