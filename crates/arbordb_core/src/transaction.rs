//! The storage transaction owned by a database handle.
//!
//! Nested `begin_transaction` calls share one [`Transaction`]: it is created
//! by the outermost begin and handed to the engine when the nesting level
//! returns to zero.

use crate::types::{SequenceNumber, TransactionId};
use arbordb_storage::{WriteBatch, WriteOp};
use bytes::Bytes;

/// An open transaction.
///
/// Writes are buffered in the engine's [`WriteBatch`] until the outermost
/// end. An inner abort dooms the transaction: the outermost end then aborts
/// even if it asked to commit.
#[derive(Debug)]
pub(crate) struct Transaction {
    id: TransactionId,
    /// Last committed sequence when the transaction began.
    snapshot_seq: SequenceNumber,
    batch: WriteBatch,
    doomed: bool,
}

impl Transaction {
    pub fn new(id: TransactionId, snapshot_seq: SequenceNumber, batch: WriteBatch) -> Self {
        Self {
            id,
            snapshot_seq,
            batch,
            doomed: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot_seq
    }

    /// Buffers a document write.
    pub fn put(&mut self, key: Bytes, meta: Bytes, body: Bytes) {
        self.batch.put(key, meta, body);
    }

    /// Buffers a purge.
    pub fn purge(&mut self, key: Bytes) {
        self.batch.purge(key);
    }

    /// The buffered write for `key`, if any.
    pub fn pending(&self, key: &[u8]) -> Option<&WriteOp> {
        self.batch.get(key)
    }

    /// Buffered writes in key order.
    pub fn pending_writes(&self) -> impl Iterator<Item = (&Bytes, &WriteOp)> {
        self.batch.iter()
    }

    pub fn write_count(&self) -> usize {
        self.batch.len()
    }

    /// Marks the transaction so the outermost end aborts it.
    pub fn doom(&mut self) {
        self.doomed = true;
    }

    pub fn is_doomed(&self) -> bool {
        self.doomed
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}
