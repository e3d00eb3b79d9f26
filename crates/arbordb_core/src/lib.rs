//! # ArborDB Core
//!
//! The handle, transaction and enumeration layer of ArborDB.
//!
//! This crate provides:
//! - Intrusive reference counting for boundary-exposed objects
//! - A database handle with nested, thread-aware transactions
//! - Translation of failures into fixed-shape boundary error records
//! - Filtered, ranged document enumeration
//!
//! ## Example
//!
//! ```rust
//! use arbordb_core::{Database, DocEnumerator, DocRange, DocumentFlags, DocumentMeta};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.begin_transaction().unwrap();
//! db.put("doc1", &DocumentMeta::new(DocumentFlags::NONE, &b"1-a"[..]), &b"{}"[..])
//!     .unwrap();
//! db.end_transaction(true).unwrap();
//!
//! let e = DocEnumerator::new(&db, &DocRange::all(), Default::default(), None).unwrap();
//! assert_eq!(e.advance().unwrap().unwrap().doc_id, "doc1");
//! assert!(e.advance().unwrap().is_none());
//! ```
//!
//! ## Features
//!
//! - `threadsafe` (default): handles may be shared between threads. Without
//!   it the handle locks become `RefCell`s.
//! - `encryption` (default): AES-256-GCM sealing of the commit log.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod document;
mod enumerator;
mod error;
mod lifecycle;
mod stats;
mod sync;
mod transaction;
mod types;

pub use config::{Config, EncryptionAlgorithm, EncryptionConfig};
pub use database::Database;
pub use document::{doc_key, Document, DocumentFlags, DocumentMeta};
pub use enumerator::{
    DocEnumerator, DocRange, DocumentFilter, EnumFlags, EnumeratorOptions, EnumeratorPhase,
};
pub use error::{
    http_status_for, panic_message, record_code, record_error, record_http_error, record_panic,
    CoreError, CoreResult, ErrorDomain, ErrorRecord, GenericCode, StorageCode,
};
pub use lifecycle::{live_object_count, InstanceCounted, RefCount, RefCounted, Release, Retained};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use types::{SequenceNumber, TransactionId};

pub use arbordb_codec as codec;
pub use arbordb_storage as storage;

/// Entry points reserved for trusted in-process callers such as indexers.
#[doc(hidden)]
pub mod internal {
    use crate::{CoreResult, Database, DocEnumerator, DocRange, DocumentFilter, EnumeratorOptions};
    use crate::{EnumFlags, Retained};

    /// Like [`DocEnumerator::new`], but also yields purged documents.
    ///
    /// # Errors
    ///
    /// Same as [`DocEnumerator::new`].
    pub fn enumerate_including_purged(
        db: &Retained<Database>,
        range: &DocRange,
        options: EnumeratorOptions,
        filter: Option<Box<dyn DocumentFilter>>,
    ) -> CoreResult<Retained<DocEnumerator>> {
        let flags = EnumFlags::from_bits_truncate(options.flags.bits()).with_purged();
        DocEnumerator::by_id(db, range, EnumeratorOptions { flags, ..options }, filter)
    }
}
