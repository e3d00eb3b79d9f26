//! # ArborDB Storage
//!
//! Storage engine trait and implementations for ArborDB.
//!
//! Engines are **ordered record stores**: they keep opaque `(key, meta, body)`
//! records sorted by key bytes and apply write batches atomically. They know
//! nothing about documents, revisions or key encodings.
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - For tests and in-memory databases
//! - [`FileEngine`] - Append-only, CRC-framed commit log with optional
//!   AES-256-GCM sealing
//!
//! ## Example
//!
//! ```rust
//! use arbordb_storage::{KeyRange, MemoryEngine, StorageEngine};
//!
//! let mut engine = MemoryEngine::new();
//! let mut batch = engine.begin_tx().unwrap();
//! batch.put(&b"doc-1"[..], &b""[..], &b"{}"[..]);
//! engine.commit_tx(batch).unwrap();
//! assert_eq!(engine.count().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod crypto;
mod engine;
mod error;
mod file;
mod frame;
mod memory;

pub use batch::{WriteBatch, WriteOp};
pub use crypto::{EncryptionKey, LogCipher, KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
pub use engine::{KeyRange, Record, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use file::{FileEngine, FileEngineOptions};
pub use frame::compute_crc32;
pub use memory::MemoryEngine;
