//! # ArborDB Codec
//!
//! Order-preserving key encoding for ArborDB.
//!
//! Structured values are encoded into bytes whose unsigned lexicographic
//! order matches the collation order of the values:
//!
//! `null < false < true < numbers < strings < arrays < maps`
//!
//! - Numbers compare by numeric value (`-0.0 == 0.0`, NaN is rejected)
//! - Strings compare by UTF-8 bytes, which is codepoint order
//! - Arrays compare element by element, a shorter prefix first
//! - Maps compare entry by entry with entries sorted by encoded key
//!
//! Encoded keys can be compared with a plain `memcmp`, so storage engines
//! use them for both exact lookup and range scans.
//!
//! ## Usage
//!
//! ```
//! use arbordb_codec::{encode_key, CollatedKey, Value};
//!
//! let a = encode_key(&Value::from(vec![Value::from("post"), Value::from(2)])).unwrap();
//! let b = encode_key(&Value::from(vec![Value::from("post"), Value::from(10)])).unwrap();
//! assert!(a < b);
//!
//! // Wrapping the raw bytes compares identically
//! let raw = CollatedKey::from_raw(a.as_bytes().to_vec());
//! assert_eq!(raw, a);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod key;
mod value;

pub use decoder::{decode_key, to_json, KeyReader, KeyTag, MAX_NESTING_DEPTH};
pub use encoder::{encode_compound, encode_key, KeyBuilder};
pub use error::{CodecError, CodecResult};
pub use key::{CollatedKey, KeyValueList};
pub use value::Value;
