//! # ArborDB FFI
//!
//! Stable C ABI for ArborDB bindings.
//!
//! This crate provides:
//! - C-compatible function exports
//! - Reference-counted database and enumerator handles
//! - Boundary error records plus a per-thread last-error message
//! - Buffer management
//!
//! ## Conventions
//!
//! - Fallible calls take an `ArbError*` slot (which may be null). On success
//!   the slot is left untouched; on failure it is filled and the call returns
//!   `false`, null, or `ArbEnumResult::Error`.
//! - Panics never unwind into the caller. They are reported as
//!   `Generic/Unexpected`.
//! - Handles returned by `arb_db_open*` and `arb_db_enumerate_*` carry one
//!   reference; give it back with the matching `*_release`.
//! - Buffers, strings and documents handed out are owned by the caller until
//!   passed to `arb_buffer_free`, `arb_string_free` or `arb_document_free`.

#![warn(missing_docs)]

mod buffer;
mod database;
mod enumerator;
mod error;
mod key;
mod object;
mod types;

pub use buffer::*;
pub use database::*;
pub use enumerator::*;
pub use error::*;
pub use key::*;
pub use object::*;
pub use types::*;
