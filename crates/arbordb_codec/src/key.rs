//! Encoded key buffers.

use crate::decoder::{self, KeyReader};
use crate::error::CodecResult;
use crate::value::Value;
use bytes::Bytes;
use std::fmt;

/// An immutable, encoded key.
///
/// Keys compare by their raw bytes, which matches the collation order of the
/// values they were built from.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CollatedKey(Bytes);

impl CollatedKey {
    /// Wrap already-encoded bytes verbatim.
    ///
    /// No validation happens here; malformed bytes surface when the key is
    /// read.
    pub fn from_raw(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the encoded bytes as a shared buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Returns the encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a reader positioned at the start of the key.
    pub fn reader(&self) -> KeyReader<'_> {
        KeyReader::new(&self.0)
    }

    /// Decodes the key, which must hold exactly one top-level value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or hold more than one value.
    pub fn to_value(&self) -> CodecResult<Value> {
        let mut reader = self.reader();
        let value = reader.read_value()?;
        if !reader.at_end() {
            return Err(crate::CodecError::unbalanced("trailing bytes after key"));
        }
        Ok(value)
    }

    /// Renders the key as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    pub fn to_json(&self) -> CodecResult<String> {
        decoder::to_json(&self.0)
    }
}

impl fmt::Debug for CollatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "CollatedKey({json})"),
            Err(_) => write!(f, "CollatedKey({:02x?})", &self.0[..]),
        }
    }
}

impl AsRef<[u8]> for CollatedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Parallel lists of encoded keys and opaque values, as emitted by an index.
///
/// `keys[i]` pairs with `values[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueList {
    keys: Vec<CollatedKey>,
    values: Vec<Bytes>,
}

impl KeyValueList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair.
    pub fn add(&mut self, key: CollatedKey, value: impl Into<Bytes>) {
        self.keys.push(key);
        self.values.push(value.into());
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the list holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`.
    pub fn key(&self, index: usize) -> Option<&CollatedKey> {
        self.keys.get(index)
    }

    /// Value at `index`.
    pub fn value(&self, index: usize) -> Option<&Bytes> {
        self.values.get(index)
    }

    /// Iterate over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&CollatedKey, &Bytes)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Remove every pair.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }
}
