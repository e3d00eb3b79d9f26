//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The commit log is corrupted beyond the recoverable tail.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The engine has been closed.
    #[error("storage is closed")]
    Closed,

    /// Encryption, decryption or key derivation failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Another process holds the database lock.
    #[error("database is locked by another process")]
    Locked,

    /// The database directory does not exist.
    #[error("database not found: {0}")]
    NotFound(String),

    /// A write was attempted on a read-only engine.
    #[error("storage is read-only")]
    ReadOnly,

    /// A storage transaction is already open.
    #[error("a storage transaction is already open")]
    Busy,

    /// A batch was committed or aborted that the engine did not hand out.
    #[error("unknown storage transaction {0}")]
    UnknownTransaction(u64),

    /// A log entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Create an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }
}
