//! In-memory storage engine.

use crate::batch::{WriteBatch, WriteOp};
use crate::crypto::EncryptionKey;
use crate::engine::{KeyRange, Record, StorageEngine};
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::collections::BTreeMap;

/// An ephemeral storage engine backed by a `BTreeMap`.
///
/// Suitable for:
/// - Unit and integration tests
/// - In-memory databases that don't need persistence
///
/// [`crate::FileEngine`] keeps one of these as its materialized state.
///
/// # Example
///
/// ```rust
/// use arbordb_storage::{KeyRange, MemoryEngine, StorageEngine};
///
/// let mut engine = MemoryEngine::new();
/// let mut batch = engine.begin_tx().unwrap();
/// batch.put(&b"k"[..], &b"meta"[..], &b"body"[..]);
/// engine.commit_tx(batch).unwrap();
///
/// let records = engine.scan(&KeyRange::all(), false).unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(engine.last_sequence(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    records: BTreeMap<Bytes, Record>,
    last_sequence: u64,
    next_tx_id: u64,
    open_tx: Option<u64>,
    read_only: bool,
    closed: bool,
}

impl MemoryEngine {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn ensure_no_tx(&self) -> StorageResult<()> {
        if self.open_tx.is_some() {
            return Err(StorageError::Busy);
        }
        Ok(())
    }

    /// Checks that `batch` is the open transaction and clears it.
    pub(crate) fn take_open_tx(&mut self, batch: &WriteBatch) -> StorageResult<()> {
        if self.open_tx != Some(batch.id()) {
            return Err(StorageError::UnknownTransaction(batch.id()));
        }
        self.open_tx = None;
        Ok(())
    }

    /// Applies committed operations. Every touched key gets the next sequence.
    pub(crate) fn apply(&mut self, ops: BTreeMap<Bytes, WriteOp>) -> u64 {
        for (key, op) in ops {
            self.last_sequence += 1;
            let sequence = self.last_sequence;
            match op {
                WriteOp::Put { meta, body } => {
                    self.records.insert(
                        key.clone(),
                        Record {
                            key,
                            meta,
                            body,
                            sequence,
                            tombstone: false,
                        },
                    );
                }
                WriteOp::Purge => {
                    // Purging a key that never existed leaves no tombstone
                    if let Some(record) = self.records.get_mut(&key) {
                        record.body = Bytes::new();
                        record.sequence = sequence;
                        record.tombstone = true;
                    }
                }
            }
        }
        self.last_sequence
    }

    /// Every stored record in key order, tombstones included.
    pub(crate) fn snapshot(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    /// Replaces the contents with a snapshot.
    pub(crate) fn load(&mut self, records: Vec<Record>, last_sequence: u64) {
        self.records = records.into_iter().map(|r| (r.key.clone(), r)).collect();
        self.last_sequence = last_sequence;
    }

    pub(crate) fn drop_tombstones(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| !r.tombstone);
        before - self.records.len()
    }
}

impl StorageEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Record>> {
        self.ensure_open()?;
        Ok(self.records.get(key).cloned())
    }

    fn scan(&self, range: &KeyRange, include_tombstones: bool) -> StorageResult<Vec<Record>> {
        self.ensure_open()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .records
            .range::<[u8], _>(range.as_slices())
            .map(|(_, r)| r)
            .filter(|r| include_tombstones || !r.tombstone)
            .cloned()
            .collect())
    }

    fn changes_since(&self, since: u64) -> StorageResult<Vec<Record>> {
        self.ensure_open()?;
        let mut changed: Vec<Record> = self
            .records
            .values()
            .filter(|r| r.sequence > since)
            .cloned()
            .collect();
        changed.sort_by_key(|r| r.sequence);
        Ok(changed)
    }

    fn count(&self) -> StorageResult<usize> {
        self.ensure_open()?;
        Ok(self.records.values().filter(|r| !r.tombstone).count())
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    fn begin_tx(&mut self) -> StorageResult<WriteBatch> {
        self.ensure_writable()?;
        self.ensure_no_tx()?;
        self.next_tx_id += 1;
        self.open_tx = Some(self.next_tx_id);
        Ok(WriteBatch::new(self.next_tx_id))
    }

    fn commit_tx(&mut self, batch: WriteBatch) -> StorageResult<u64> {
        self.ensure_writable()?;
        self.take_open_tx(&batch)?;
        Ok(self.apply(batch.into_ops()))
    }

    fn abort_tx(&mut self, batch: WriteBatch) -> StorageResult<()> {
        self.take_open_tx(&batch)
    }

    fn compact(&mut self) -> StorageResult<usize> {
        self.ensure_writable()?;
        self.ensure_no_tx()?;
        Ok(self.drop_tombstones())
    }

    fn rekey(&mut self, _key: Option<&EncryptionKey>) -> StorageResult<()> {
        // Nothing is stored outside the process, so there is nothing to seal
        self.ensure_writable()?;
        self.ensure_no_tx()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.closed = true;
        self.open_tx = None;
        Ok(())
    }

    fn destroy(&mut self) -> StorageResult<()> {
        self.records.clear();
        self.last_sequence = 0;
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;

    fn commit_puts(engine: &mut MemoryEngine, keys: &[&'static str]) -> u64 {
        let mut batch = engine.begin_tx().unwrap();
        for key in keys {
            batch.put(key.as_bytes(), &b"m"[..], key.as_bytes());
        }
        engine.commit_tx(batch).unwrap()
    }

    fn keys(records: &[Record]) -> Vec<&[u8]> {
        records.iter().map(|r| r.key.as_ref()).collect()
    }

    #[test]
    fn commit_assigns_sequences() {
        let mut engine = MemoryEngine::new();
        assert_eq!(commit_puts(&mut engine, &["a", "b"]), 2);
        assert_eq!(commit_puts(&mut engine, &["a"]), 3);
        assert_eq!(engine.get(b"a").unwrap().unwrap().sequence, 3);
        assert_eq!(engine.get(b"b").unwrap().unwrap().sequence, 2);
        assert_eq!(engine.count().unwrap(), 2);
    }

    #[test]
    fn abort_discards_batch() {
        let mut engine = MemoryEngine::new();
        let mut batch = engine.begin_tx().unwrap();
        batch.put(&b"x"[..], &b""[..], &b""[..]);
        engine.abort_tx(batch).unwrap();
        assert!(engine.get(b"x").unwrap().is_none());
        assert_eq!(engine.last_sequence(), 0);
    }

    #[test]
    fn one_transaction_at_a_time() {
        let mut engine = MemoryEngine::new();
        let batch = engine.begin_tx().unwrap();
        assert!(matches!(engine.begin_tx(), Err(StorageError::Busy)));
        assert!(matches!(engine.compact(), Err(StorageError::Busy)));
        engine.abort_tx(batch).unwrap();

        let stale = WriteBatch::new(99);
        assert!(matches!(
            engine.commit_tx(stale),
            Err(StorageError::UnknownTransaction(99))
        ));
    }

    #[test]
    fn scan_respects_bounds() {
        let mut engine = MemoryEngine::new();
        commit_puts(&mut engine, &["a", "b", "c", "d"]);

        let range = KeyRange::new(
            Bound::Excluded(Bytes::from_static(b"a")),
            Bound::Included(Bytes::from_static(b"c")),
        );
        assert_eq!(keys(&engine.scan(&range, false).unwrap()), vec![b"b", b"c"]);

        let inverted = KeyRange::new(
            Bound::Included(Bytes::from_static(b"d")),
            Bound::Included(Bytes::from_static(b"a")),
        );
        assert!(engine.scan(&inverted, false).unwrap().is_empty());
    }

    #[test]
    fn purge_leaves_tombstone_until_compact() {
        let mut engine = MemoryEngine::new();
        commit_puts(&mut engine, &["a", "b"]);

        let mut batch = engine.begin_tx().unwrap();
        batch.purge(&b"a"[..]);
        batch.purge(&b"never"[..]);
        engine.commit_tx(batch).unwrap();

        assert_eq!(keys(&engine.scan(&KeyRange::all(), false).unwrap()), vec![b"b"]);
        let all = engine.scan(&KeyRange::all(), true).unwrap();
        assert_eq!(keys(&all), vec![b"a", b"b"]);
        assert!(all[0].tombstone);
        assert_eq!(all[0].meta.as_ref(), b"m");
        assert!(all[0].body.is_empty());
        assert_eq!(engine.count().unwrap(), 1);

        assert_eq!(engine.compact().unwrap(), 1);
        assert!(engine.get(b"a").unwrap().is_none());
    }

    #[test]
    fn changes_are_ordered_by_sequence() {
        let mut engine = MemoryEngine::new();
        commit_puts(&mut engine, &["b", "c"]);
        commit_puts(&mut engine, &["a"]);
        let changes = engine.changes_since(1).unwrap();
        assert_eq!(keys(&changes), vec![b"c", b"a"]);
    }

    #[test]
    fn closed_engine_refuses_calls() {
        let mut engine = MemoryEngine::new();
        engine.close().unwrap();
        assert!(matches!(engine.get(b"a"), Err(StorageError::Closed)));
        assert!(matches!(engine.begin_tx(), Err(StorageError::Closed)));
    }
}
