//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or reading collated keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// NaN has no position in the total order.
    #[error("NaN cannot be encoded in a collated key")]
    NaNForbidden,

    /// A map contained the same key twice.
    #[error("duplicate map key in collated key")]
    DuplicateMapKey,

    /// Builder calls did not nest properly.
    #[error("unbalanced key builder: {message}")]
    Unbalanced {
        /// Description of the nesting problem.
        message: String,
    },

    /// Encoded bytes ended in the middle of a value.
    #[error("unexpected end of collated key")]
    UnexpectedEof,

    /// An encoded byte is not a known value tag.
    #[error("invalid collation tag 0x{tag:02x} at offset {offset}")]
    InvalidTag {
        /// The offending byte.
        tag: u8,
        /// Offset of the byte in the key.
        offset: usize,
    },

    /// Arrays and maps were nested deeper than the reader allows.
    #[error("collated key nested deeper than {limit} levels")]
    NestingTooDeep {
        /// The maximum nesting depth.
        limit: usize,
    },

    /// String contents were not UTF-8.
    #[error("invalid UTF-8 string in collated key")]
    InvalidUtf8,

    /// A JSON document could not be converted.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the JSON problem.
        message: String,
    },
}

impl CodecError {
    /// Create an unbalanced-builder error.
    pub fn unbalanced(message: impl Into<String>) -> Self {
        Self::Unbalanced {
            message: message.into(),
        }
    }

    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }
}
