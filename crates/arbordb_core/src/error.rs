//! Error types for ArborDB core and their translation into boundary records.
//!
//! Every failure is reported in one of two ways: as a [`CoreError`] inside
//! Rust, or as an [`ErrorRecord`] once it has been translated for a foreign
//! caller. Translation is lossless for domain errors; panics become
//! [`GenericCode::Unexpected`].

use arbordb_codec::CodecError;
use arbordb_storage::StorageError;
use std::any::Any;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ArborDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Key encoding error.
    #[error("encoding error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error outside the storage engine.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The operation needs an open transaction owned by the calling thread.
    #[error("not in a transaction")]
    NotInTransaction,

    /// The operation is not allowed while a transaction is open.
    #[error("transaction is still open")]
    TransactionNotClosed,

    /// The outermost commit found the transaction doomed by an inner abort.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// A document does not exist.
    #[error("document not found: {doc_id}")]
    NotFound {
        /// The missing document ID.
        doc_id: String,
    },

    /// A write conflicted with existing data.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// The database handle has been closed.
    #[error("database is not open")]
    NotOpen,

    /// An enumerator outlived the transaction it was created in.
    #[error("enumerator invalidated: {reason}")]
    EnumeratorInvalidated {
        /// Why the enumerator can no longer advance.
        reason: String,
    },

    /// A caller passed an unusable argument.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the bad argument.
        message: String,
    },

    /// Document metadata could not be (de)serialized.
    #[error("invalid document metadata: {message}")]
    InvalidMetadata {
        /// Description of the problem.
        message: String,
    },

    /// An error reported with an HTTP status by a higher layer.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Status message.
        message: String,
    },

    /// A fault with no better classification, including caught panics.
    #[error("unexpected error: {message}")]
    Unexpected {
        /// Best-effort description of the fault.
        message: String,
    },
}

impl CoreError {
    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(doc_id: impl Into<String>) -> Self {
        Self::NotFound {
            doc_id: doc_id.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an enumerator invalidated error.
    pub fn enumerator_invalidated(reason: impl Into<String>) -> Self {
        Self::EnumeratorInvalidated {
            reason: reason.into(),
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates an invalid metadata error.
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Creates an HTTP error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Returns the boundary domain and code for this error.
    pub fn domain_and_code(&self) -> (ErrorDomain, i32) {
        match self {
            Self::Storage(e) => storage_domain_and_code(e),
            Self::Io(e) => (ErrorDomain::Posix, posix_code(e)),
            Self::Codec(_) => (ErrorDomain::Generic, GenericCode::EncodingFailed as i32),
            Self::NotInTransaction => (ErrorDomain::Generic, GenericCode::NotInTransaction as i32),
            Self::TransactionNotClosed => (
                ErrorDomain::Generic,
                GenericCode::TransactionNotClosed as i32,
            ),
            Self::TransactionAborted { .. } => (
                ErrorDomain::Generic,
                GenericCode::TransactionAborted as i32,
            ),
            Self::NotFound { .. } => (ErrorDomain::Generic, GenericCode::NotFound as i32),
            Self::Conflict { .. } => (ErrorDomain::Generic, GenericCode::Conflict as i32),
            Self::NotOpen => (ErrorDomain::Generic, GenericCode::NotOpen as i32),
            Self::EnumeratorInvalidated { .. } => (
                ErrorDomain::Generic,
                GenericCode::EnumeratorInvalidated as i32,
            ),
            Self::InvalidParameter { .. } => {
                (ErrorDomain::Generic, GenericCode::InvalidParameter as i32)
            }
            Self::InvalidMetadata { .. } => (ErrorDomain::Generic, GenericCode::CorruptData as i32),
            Self::Http { status, .. } => (ErrorDomain::Http, i32::from(*status)),
            Self::Unexpected { .. } => (ErrorDomain::Generic, GenericCode::Unexpected as i32),
        }
    }

    /// Returns the HTTP status that best describes this error.
    pub fn http_status(&self) -> u16 {
        let (domain, code) = self.domain_and_code();
        http_status_for(domain, code)
    }
}

fn storage_domain_and_code(e: &StorageError) -> (ErrorDomain, i32) {
    let code = match e {
        StorageError::Io(io) => return (ErrorDomain::Posix, posix_code(io)),
        StorageError::Corrupted(_) => StorageCode::Corrupted,
        StorageError::Closed => StorageCode::Closed,
        StorageError::Encryption(_) => StorageCode::Encryption,
        StorageError::Locked => StorageCode::Locked,
        StorageError::NotFound(_) => StorageCode::NotFound,
        StorageError::ReadOnly => StorageCode::ReadOnly,
        StorageError::Busy => StorageCode::Busy,
        StorageError::UnknownTransaction(_) => StorageCode::UnknownTransaction,
        StorageError::Serialization(_) => StorageCode::Serialization,
    };
    (ErrorDomain::Storage, code as i32)
}

/// `EIO`, used when an I/O error carries no OS code.
const EIO: i32 = 5;

fn posix_code(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(EIO)
}

/// Maps a boundary `(domain, code)` pair onto an HTTP status.
///
/// not found → 404, conflict → 409, busy → 503, locked → 423,
/// permission → 403, bad input → 400, anything else → 500.
pub fn http_status_for(domain: ErrorDomain, code: i32) -> u16 {
    const ENOENT: i32 = 2;
    const EACCES: i32 = 13;
    const EPERM: i32 = 1;

    match domain {
        ErrorDomain::None => 200,
        ErrorDomain::Http => u16::try_from(code).unwrap_or(500),
        ErrorDomain::Posix => match code {
            ENOENT => 404,
            EACCES | EPERM => 403,
            _ => 500,
        },
        ErrorDomain::Storage => match StorageCode::from_code(code) {
            Some(StorageCode::NotFound) => 404,
            Some(StorageCode::Busy) => 503,
            Some(StorageCode::Locked) => 423,
            Some(StorageCode::ReadOnly) => 403,
            _ => 500,
        },
        ErrorDomain::Generic => match GenericCode::from_code(code) {
            Some(GenericCode::NotFound) => 404,
            Some(GenericCode::Conflict) => 409,
            Some(GenericCode::Busy) => 503,
            Some(GenericCode::Locked) => 423,
            Some(GenericCode::NotWriteable) => 403,
            Some(GenericCode::InvalidParameter | GenericCode::EncodingFailed) => 400,
            _ => 500,
        },
    }
}

/// Where an error code comes from.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorDomain {
    /// No error.
    #[default]
    None = 0,
    /// HTTP status code.
    Http = 1,
    /// POSIX `errno` value.
    Posix = 2,
    /// [`StorageCode`] value.
    Storage = 3,
    /// [`GenericCode`] value.
    Generic = 4,
}

impl ErrorDomain {
    /// Converts a raw domain value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Http,
            2 => Self::Posix,
            3 => Self::Storage,
            4 => Self::Generic,
            _ => return None,
        })
    }
}

/// Codes in the [`ErrorDomain::Generic`] domain.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum GenericCode {
    Unexpected = 1,
    NotInTransaction = 2,
    TransactionNotClosed = 3,
    TransactionAborted = 4,
    InvalidParameter = 5,
    EncodingFailed = 6,
    NotOpen = 7,
    EnumeratorInvalidated = 8,
    NotFound = 9,
    Conflict = 10,
    Busy = 11,
    Locked = 12,
    NotWriteable = 13,
    CorruptData = 14,
}

impl GenericCode {
    /// Converts a raw code.
    pub fn from_code(code: i32) -> Option<Self> {
        const ALL: [GenericCode; 14] = [
            GenericCode::Unexpected,
            GenericCode::NotInTransaction,
            GenericCode::TransactionNotClosed,
            GenericCode::TransactionAborted,
            GenericCode::InvalidParameter,
            GenericCode::EncodingFailed,
            GenericCode::NotOpen,
            GenericCode::EnumeratorInvalidated,
            GenericCode::NotFound,
            GenericCode::Conflict,
            GenericCode::Busy,
            GenericCode::Locked,
            GenericCode::NotWriteable,
            GenericCode::CorruptData,
        ];
        ALL.into_iter().find(|c| *c as i32 == code)
    }
}

/// Codes in the [`ErrorDomain::Storage`] domain.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum StorageCode {
    Corrupted = 1,
    Closed = 2,
    Encryption = 3,
    Locked = 4,
    NotFound = 5,
    ReadOnly = 6,
    Busy = 7,
    UnknownTransaction = 8,
    Serialization = 9,
}

impl StorageCode {
    /// Converts a raw code.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Corrupted,
            2 => Self::Closed,
            3 => Self::Encryption,
            4 => Self::Locked,
            5 => Self::NotFound,
            6 => Self::ReadOnly,
            7 => Self::Busy,
            8 => Self::UnknownTransaction,
            9 => Self::Serialization,
            _ => return None,
        })
    }
}

/// A fixed-shape error descriptor handed across the boundary.
///
/// A record with [`ErrorDomain::None`] means success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Error domain.
    pub domain: ErrorDomain,
    /// Domain-specific code. 0 for success.
    pub code: i32,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl ErrorRecord {
    /// A success record.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true if this record describes a failure.
    pub fn is_error(&self) -> bool {
        self.domain != ErrorDomain::None
    }

    /// Returns the HTTP status for this record.
    pub fn http_status(&self) -> u16 {
        http_status_for(self.domain, self.code)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.domain, self.code)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl From<&CoreError> for ErrorRecord {
    fn from(err: &CoreError) -> Self {
        let (domain, code) = err.domain_and_code();
        Self {
            domain,
            code,
            message: Some(err.to_string()),
        }
    }
}

/// Fills `out`, if present, with the translation of `err`.
pub fn record_error(err: &CoreError, out: Option<&mut ErrorRecord>) {
    if let Some(out) = out {
        *out = ErrorRecord::from(err);
    }
}

/// Fills `out`, if present, with an explicit domain and code.
pub fn record_code(
    domain: ErrorDomain,
    code: i32,
    message: Option<String>,
    out: Option<&mut ErrorRecord>,
) {
    if let Some(out) = out {
        *out = ErrorRecord {
            domain,
            code,
            message,
        };
    }
}

/// Fills `out`, if present, with an HTTP error.
pub fn record_http_error(status: u16, message: Option<String>, out: Option<&mut ErrorRecord>) {
    record_code(ErrorDomain::Http, i32::from(status), message, out);
}

/// Fills `out`, if present, for a caught panic.
pub fn record_panic(payload: &(dyn Any + Send), out: Option<&mut ErrorRecord>) {
    let message = panic_message(payload);
    record_code(
        ErrorDomain::Generic,
        GenericCode::Unexpected as i32,
        Some(message),
        out,
    );
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_translate_verbatim() {
        let err = CoreError::from(StorageError::Locked);
        let record = ErrorRecord::from(&err);
        assert_eq!(record.domain, ErrorDomain::Storage);
        assert_eq!(record.code, StorageCode::Locked as i32);
        assert_eq!(record.http_status(), 423);

        let err = CoreError::http(418, "teapot");
        assert_eq!(err.domain_and_code(), (ErrorDomain::Http, 418));
        assert_eq!(err.http_status(), 418);
    }

    #[test]
    fn io_errors_use_posix_domain() {
        let err = CoreError::from(io::Error::from_raw_os_error(2));
        assert_eq!(err.domain_and_code(), (ErrorDomain::Posix, 2));
        assert_eq!(err.http_status(), 404);

        let err = CoreError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.domain_and_code(), (ErrorDomain::Posix, EIO));
    }

    #[test]
    fn http_translation_table() {
        assert_eq!(CoreError::not_found("doc").http_status(), 404);
        assert_eq!(CoreError::conflict("rev").http_status(), 409);
        assert_eq!(CoreError::from(StorageError::Busy).http_status(), 503);
        assert_eq!(CoreError::from(StorageError::ReadOnly).http_status(), 403);
        assert_eq!(CoreError::invalid_parameter("x").http_status(), 400);
        assert_eq!(CoreError::from(CodecError::NaNForbidden).http_status(), 400);
        assert_eq!(CoreError::NotInTransaction.http_status(), 500);
        assert_eq!(CoreError::unexpected("?").http_status(), 500);
    }

    #[test]
    fn null_slot_is_left_alone() {
        record_error(&CoreError::NotOpen, None);
        record_panic(&"boom", None);

        let mut slot = ErrorRecord::none();
        assert!(!slot.is_error());
        record_error(&CoreError::NotOpen, Some(&mut slot));
        assert_eq!(slot.domain, ErrorDomain::Generic);
        assert_eq!(slot.code, GenericCode::NotOpen as i32);
        assert_eq!(slot.message.as_deref(), Some("database is not open"));
    }

    #[test]
    fn panics_become_unexpected() {
        let mut slot = ErrorRecord::none();
        let payload: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
        record_panic(payload.as_ref(), Some(&mut slot));
        assert_eq!(slot.domain, ErrorDomain::Generic);
        assert_eq!(slot.code, GenericCode::Unexpected as i32);
        assert_eq!(slot.message.as_deref(), Some("index out of bounds"));

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn raw_code_roundtrip() {
        for raw in 1..=14 {
            assert_eq!(GenericCode::from_code(raw).map(|c| c as i32), Some(raw));
        }
        assert_eq!(GenericCode::from_code(99), None);
        assert_eq!(ErrorDomain::from_raw(3), Some(ErrorDomain::Storage));
        assert_eq!(ErrorDomain::from_raw(7), None);
    }
}
