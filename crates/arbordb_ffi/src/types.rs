//! Boundary types: opaque handles, configuration and document records.

use crate::buffer::{read_bytes, read_opt_str, ArbBuffer, ArbString};
use arbordb_core::{
    Config, CoreError, CoreResult, Document, DocumentFlags, DocumentMeta, EncryptionAlgorithm,
    EncryptionConfig, EnumFlags, EnumeratorOptions, StatsSnapshot,
};
use std::ffi::c_char;

/// An opaque, reference-counted database handle.
#[repr(C)]
pub struct ArbDatabase {
    _private: [u8; 0],
}

/// An opaque, reference-counted document enumerator.
#[repr(C)]
pub struct ArbEnumerator {
    _private: [u8; 0],
}

/// An opaque ordered-key builder.
#[repr(C)]
pub struct ArbKey {
    _private: [u8; 0],
}

/// An opaque list of key/value pairs.
#[repr(C)]
pub struct ArbKeyValueList {
    _private: [u8; 0],
}

/// Database configuration for FFI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArbDatabaseConfig {
    /// Whether to create if not exists.
    pub create_if_missing: bool,
    /// Whether to refuse every write.
    pub read_only: bool,
    /// Whether to sync on commit.
    pub sync_on_commit: bool,
    /// `0` for none, `1` for AES-256-GCM.
    pub encryption_algorithm: u32,
    /// Key material. May be null when `encryption_key_len` is 0.
    pub encryption_key: *const u8,
    /// Length of the key material.
    pub encryption_key_len: usize,
}

impl Default for ArbDatabaseConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            create_if_missing: config.create_if_missing,
            read_only: config.read_only,
            sync_on_commit: config.sync_on_commit,
            encryption_algorithm: EncryptionAlgorithm::None as u32,
            encryption_key: std::ptr::null(),
            encryption_key_len: 0,
        }
    }
}

impl ArbDatabaseConfig {
    /// Converts into a core [`Config`].
    ///
    /// # Safety
    ///
    /// `encryption_key` must be null or valid for `encryption_key_len` bytes.
    pub(crate) unsafe fn to_config(&self) -> CoreResult<Config> {
        let encryption = encryption_config(
            self.encryption_algorithm,
            self.encryption_key,
            self.encryption_key_len,
        )?;
        Ok(Config::new()
            .create_if_missing(self.create_if_missing)
            .read_only(self.read_only)
            .sync_on_commit(self.sync_on_commit)
            .encryption(encryption))
    }
}

/// Builds an [`EncryptionConfig`] from raw boundary arguments.
///
/// # Safety
///
/// `key` must be null or valid for `key_len` bytes.
pub(crate) unsafe fn encryption_config(
    algorithm: u32,
    key: *const u8,
    key_len: usize,
) -> CoreResult<EncryptionConfig> {
    let key = read_bytes(key, key_len, "encryption key")?;
    match EncryptionAlgorithm::from_raw(algorithm) {
        Some(EncryptionAlgorithm::None) if key.is_empty() => Ok(EncryptionConfig::none()),
        Some(EncryptionAlgorithm::None) => Err(CoreError::invalid_parameter(
            "encryption key given without an algorithm",
        )),
        Some(EncryptionAlgorithm::Aes256Gcm) => Ok(EncryptionConfig::aes256_gcm(key)),
        None => Err(CoreError::invalid_parameter(format!(
            "unknown encryption algorithm {algorithm}"
        ))),
    }
}

/// Returns the default configuration.
#[no_mangle]
pub extern "C" fn arb_config_default() -> ArbDatabaseConfig {
    ArbDatabaseConfig::default()
}

/// Revision metadata supplied with a write.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArbDocumentMeta {
    /// Revision flags (`DELETED = 1`, `CONFLICTED = 2`, `HAS_ATTACHMENTS = 4`).
    pub flags: u32,
    /// Revision ID bytes.
    pub rev_id: *const u8,
    /// Length of the revision ID.
    pub rev_id_len: usize,
    /// Document type (null-terminated UTF-8), or null.
    pub doc_type: *const c_char,
}

impl ArbDocumentMeta {
    /// Converts into core metadata.
    ///
    /// # Safety
    ///
    /// `rev_id` must be valid for `rev_id_len` bytes and `doc_type` must be
    /// null or a valid string.
    pub(crate) unsafe fn to_meta(&self) -> CoreResult<DocumentMeta> {
        let rev_id = read_bytes(self.rev_id, self.rev_id_len, "revision ID")?;
        let meta = DocumentMeta::new(DocumentFlags::from_bits(self.flags), rev_id);
        Ok(match read_opt_str(self.doc_type, "document type")? {
            Some(doc_type) => meta.with_doc_type(doc_type),
            None => meta,
        })
    }
}

/// A document handed out by a read or an enumerator.
///
/// Release the owned fields with `arb_document_free`.
#[repr(C)]
#[derive(Debug)]
pub struct ArbDocument {
    /// The document ID.
    pub doc_id: ArbString,
    /// Revision ID bytes.
    pub rev_id: ArbBuffer,
    /// Document type, or a null string.
    pub doc_type: ArbString,
    /// Revision flags, always including `EXISTS = 0x1000`.
    pub flags: u32,
    /// Sequence of the last change. 0 for an uncommitted write.
    pub sequence: u64,
    /// True if `body` was loaded.
    pub has_body: bool,
    /// The body, when loaded.
    pub body: ArbBuffer,
    /// True for a purged document seen by a privileged enumeration.
    pub purged: bool,
}

impl ArbDocument {
    /// A document with no owned fields.
    pub fn empty() -> Self {
        Self {
            doc_id: ArbString::empty(),
            rev_id: ArbBuffer::empty(),
            doc_type: ArbString::empty(),
            flags: 0,
            sequence: 0,
            has_body: false,
            body: ArbBuffer::empty(),
            purged: false,
        }
    }

    pub(crate) fn from_document(doc: &Document) -> CoreResult<Self> {
        let doc_type = match doc.doc_type() {
            Some(doc_type) => ArbString::try_from_str(doc_type, "document type")?,
            None => ArbString::empty(),
        };
        let doc_id = match ArbString::try_from_str(&doc.doc_id, "document ID") {
            Ok(doc_id) => doc_id,
            Err(e) => {
                // Safety: created above
                unsafe { crate::buffer::arb_string_free(doc_type) };
                return Err(e);
            }
        };
        Ok(Self {
            doc_id,
            rev_id: ArbBuffer::copy_from(&doc.meta.rev_id),
            doc_type,
            flags: doc.flags().bits(),
            sequence: doc.sequence.as_u64(),
            has_body: doc.body.is_some(),
            body: doc
                .body
                .as_ref()
                .map_or_else(ArbBuffer::empty, |body| ArbBuffer::copy_from(body)),
            purged: doc.purged,
        })
    }
}

/// Frees the owned fields of a document and resets it to empty.
///
/// # Safety
///
/// `doc` must be null or point to a document filled by ArborDB that was not
/// freed since.
#[no_mangle]
pub unsafe extern "C" fn arb_document_free(doc: *mut ArbDocument) {
    let Some(doc) = doc.as_mut() else {
        return;
    };
    let owned = std::mem::replace(doc, ArbDocument::empty());
    crate::buffer::arb_string_free(owned.doc_id);
    crate::buffer::arb_buffer_free(owned.rev_id);
    crate::buffer::arb_string_free(owned.doc_type);
    crate::buffer::arb_buffer_free(owned.body);
}

/// Enumeration options for FFI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArbEnumeratorOptions {
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Enumeration flags (`DESCENDING = 0x01`, `INCLUSIVE_START = 0x02`,
    /// `INCLUSIVE_END = 0x04`, `INCLUDE_DELETED = 0x08`,
    /// `INCLUDE_NON_CONFLICTED = 0x10`, `INCLUDE_BODIES = 0x20`).
    pub flags: u16,
}

impl Default for ArbEnumeratorOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            flags: EnumFlags::DEFAULT.bits(),
        }
    }
}

impl ArbEnumeratorOptions {
    pub(crate) fn to_options(self) -> EnumeratorOptions {
        EnumeratorOptions::with_flags(EnumFlags::from_bits_truncate(self.flags)).skip(self.skip)
    }
}

/// Returns the default enumeration options.
#[no_mangle]
pub extern "C" fn arb_enum_options_default() -> ArbEnumeratorOptions {
    ArbEnumeratorOptions::default()
}

/// Outcome of `arb_enum_next`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbEnumResult {
    /// A document was written to the output.
    Document = 0,
    /// No more documents.
    End = 1,
    /// The error record was filled.
    Error = 2,
}

/// Database statistics for FFI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ArbStats {
    /// Number of document reads.
    pub reads: u64,
    /// Number of document writes.
    pub writes: u64,
    /// Number of purges.
    pub purges: u64,
    /// Number of outermost transactions begun.
    pub transactions_started: u64,
    /// Number of transactions committed.
    pub transactions_committed: u64,
    /// Number of transactions aborted.
    pub transactions_aborted: u64,
    /// Number of enumerators created.
    pub enumerations: u64,
    /// Number of failed operations.
    pub errors: u64,
}

impl From<StatsSnapshot> for ArbStats {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            reads: stats.reads,
            writes: stats.writes,
            purges: stats.purges,
            transactions_started: stats.transactions_started,
            transactions_committed: stats.transactions_committed,
            transactions_aborted: stats.transactions_aborted,
            enumerations: stats.enumerations,
            errors: stats.errors,
        }
    }
}
