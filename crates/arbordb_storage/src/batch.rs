//! Write batches: the buffered contents of an open storage transaction.

use bytes::Bytes;
use std::collections::BTreeMap;

/// A pending change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a record.
    Put {
        /// Opaque record metadata.
        meta: Bytes,
        /// Opaque record body.
        body: Bytes,
    },
    /// Replace the record with a tombstone that keeps its metadata.
    Purge,
}

/// Writes buffered by an open storage transaction.
///
/// A batch is handed out by [`crate::StorageEngine::begin_tx`] and is applied
/// atomically by [`crate::StorageEngine::commit_tx`]. Later writes to the same
/// key replace earlier ones.
#[derive(Debug)]
pub struct WriteBatch {
    id: u64,
    ops: BTreeMap<Bytes, WriteOp>,
}

impl WriteBatch {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            ops: BTreeMap::new(),
        }
    }

    /// Returns the storage transaction id this batch belongs to.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Buffer a put.
    pub fn put(&mut self, key: impl Into<Bytes>, meta: impl Into<Bytes>, body: impl Into<Bytes>) {
        self.ops.insert(
            key.into(),
            WriteOp::Put {
                meta: meta.into(),
                body: body.into(),
            },
        );
    }

    /// Buffer a purge.
    pub fn purge(&mut self, key: impl Into<Bytes>) {
        self.ops.insert(key.into(), WriteOp::Purge);
    }

    /// Returns the buffered operation for a key.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&WriteOp> {
        self.ops.get(key)
    }

    /// Number of keys touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over the buffered operations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &WriteOp)> {
        self.ops.iter()
    }

    pub(crate) fn into_ops(self) -> BTreeMap<Bytes, WriteOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_write_wins() {
        let mut batch = WriteBatch::new(7);
        batch.put(&b"k"[..], &b"m1"[..], &b"b1"[..]);
        batch.purge(&b"k"[..]);
        batch.put(&b"j"[..], &b"m2"[..], &b"b2"[..]);

        assert_eq!(batch.id(), 7);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(b"k"), Some(&WriteOp::Purge));
        let keys: Vec<_> = batch.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Bytes::from_static(b"j"), Bytes::from_static(b"k")]);
    }
}
