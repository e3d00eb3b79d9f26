//! Documents and their versioned metadata.
//!
//! The storage engine keeps opaque records. A document maps onto one record:
//!
//! - key: the document ID as an encoded string key
//! - meta: [`DocumentMeta`] as CBOR
//! - body: the current revision body
//!
//! Purging a document turns its record into a tombstone that keeps the
//! metadata and drops the body.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use arbordb_codec::{encode_key, CollatedKey, Value};
use arbordb_storage::Record;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Flags describing the state of a document's current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFlags(u32);

impl DocumentFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The current revision is a deletion.
    pub const DELETED: Self = Self(0x01);
    /// The document has unresolved conflicting revisions.
    pub const CONFLICTED: Self = Self(0x02);
    /// The current revision references attachments.
    pub const HAS_ATTACHMENTS: Self = Self(0x04);
    /// The document exists in storage. Set on every document read back.
    pub const EXISTS: Self = Self(0x1000);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DocumentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Versioned-document metadata stored next to each body.
///
/// The revision-tree format is owned by a higher layer; the core only needs
/// the flags, the current revision ID and the document type for filtering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Revision flags.
    pub flags: DocumentFlags,
    /// Current revision ID.
    pub rev_id: Vec<u8>,
    /// Application-defined document type.
    pub doc_type: Option<String>,
}

impl DocumentMeta {
    /// Creates metadata for a revision.
    pub fn new(flags: DocumentFlags, rev_id: impl Into<Vec<u8>>) -> Self {
        Self {
            flags,
            rev_id: rev_id.into(),
            doc_type: None,
        }
    }

    /// Sets the document type.
    #[must_use]
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Encodes the metadata as CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out)
            .map_err(|e| CoreError::invalid_metadata(e.to_string()))?;
        Ok(out)
    }

    /// Decodes metadata written by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid metadata.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::invalid_metadata(e.to_string()))
    }
}

/// Encodes a document ID into its storage key.
///
/// # Errors
///
/// Returns an error if the key cannot be encoded.
pub fn doc_key(doc_id: &str) -> CoreResult<CollatedKey> {
    Ok(encode_key(&Value::Text(doc_id.to_string()))?)
}

/// Recovers the document ID from a storage key.
pub(crate) fn doc_id_from_key(key: &[u8]) -> CoreResult<String> {
    match CollatedKey::from_raw(Bytes::copy_from_slice(key)).to_value()? {
        Value::Text(doc_id) => Ok(doc_id),
        other => Err(CoreError::invalid_metadata(format!(
            "document key is not a string: {other:?}"
        ))),
    }
}

/// A document as read from a handle or an enumerator.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    /// The document ID.
    pub doc_id: String,
    /// Metadata of the current revision. `flags` always contains
    /// [`DocumentFlags::EXISTS`].
    pub meta: DocumentMeta,
    /// Sequence of the last change, or [`SequenceNumber::PENDING`] for a write
    /// that is not committed yet.
    pub sequence: SequenceNumber,
    /// The body, if it was loaded.
    pub body: Option<Bytes>,
    /// True if the document was purged and is only visible to privileged
    /// enumerations.
    pub purged: bool,
}

impl Document {
    pub(crate) fn from_record(record: &Record, with_body: bool) -> CoreResult<Self> {
        let mut meta = DocumentMeta::decode(&record.meta)?;
        meta.flags = meta.flags | DocumentFlags::EXISTS;
        Ok(Self {
            doc_id: doc_id_from_key(&record.key)?,
            meta,
            sequence: SequenceNumber::new(record.sequence),
            body: (with_body && !record.tombstone).then(|| record.body.clone()),
            purged: record.tombstone,
        })
    }

    /// Shorthand for the revision flags.
    #[must_use]
    pub fn flags(&self) -> DocumentFlags {
        self.meta.flags
    }

    /// Shorthand for the document type.
    #[must_use]
    pub fn doc_type(&self) -> Option<&str> {
        self.meta.doc_type.as_deref()
    }

    /// Returns true if the current revision is a deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.meta.flags.contains(DocumentFlags::DELETED)
    }

    /// Returns true if the document has conflicts.
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.meta.flags.contains(DocumentFlags::CONFLICTED)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("doc_id", &self.doc_id)
            .field("meta", &self.meta)
            .field("sequence", &self.sequence)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("purged", &self.purged)
            .finish()
    }
}
