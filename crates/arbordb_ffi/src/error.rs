//! Boundary error records and the per-thread last-error message.

use arbordb_core::{
    http_status_for, record_panic, CoreError, CoreResult, ErrorDomain, ErrorRecord, GenericCode,
};
use std::cell::RefCell;
use std::ffi::{c_char, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Error domain of an [`ArbError`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbErrorDomain {
    /// Success.
    #[default]
    None = 0,
    /// HTTP status codes.
    Http = 1,
    /// POSIX errno values.
    Posix = 2,
    /// Storage engine codes.
    Storage = 3,
    /// Generic codes.
    Generic = 4,
}

impl From<ErrorDomain> for ArbErrorDomain {
    fn from(domain: ErrorDomain) -> Self {
        match domain {
            ErrorDomain::None => Self::None,
            ErrorDomain::Http => Self::Http,
            ErrorDomain::Posix => Self::Posix,
            ErrorDomain::Storage => Self::Storage,
            ErrorDomain::Generic => Self::Generic,
        }
    }
}

impl From<ArbErrorDomain> for ErrorDomain {
    fn from(domain: ArbErrorDomain) -> Self {
        match domain {
            ArbErrorDomain::None => Self::None,
            ArbErrorDomain::Http => Self::Http,
            ArbErrorDomain::Posix => Self::Posix,
            ArbErrorDomain::Storage => Self::Storage,
            ArbErrorDomain::Generic => Self::Generic,
        }
    }
}

/// A boundary error record.
///
/// A domain of [`ArbErrorDomain::None`] means success. The message of the most
/// recent failure on the calling thread is available from
/// [`arb_last_error_message`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbError {
    /// Error domain.
    pub domain: ArbErrorDomain,
    /// Domain-specific code. 0 on success.
    pub code: i32,
}

impl ArbError {
    /// A success record.
    pub const fn none() -> Self {
        Self {
            domain: ArbErrorDomain::None,
            code: 0,
        }
    }

    /// Returns true if the record describes a failure.
    pub fn is_error(&self) -> bool {
        self.domain != ArbErrorDomain::None
    }
}

impl From<&ErrorRecord> for ArbError {
    fn from(record: &ErrorRecord) -> Self {
        Self {
            domain: record.domain.into(),
            code: record.code,
        }
    }
}

// Thread-local storage for last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Sets the last error message.
pub fn set_last_error(message: impl Into<String>) {
    let msg = message.into().replace('\0', "\\0");
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clears the last error.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Stores `record` in `out`, when non-null, and remembers its message.
///
/// # Safety
///
/// `out` must be null or valid for writes.
pub(crate) unsafe fn report(out: *mut ArbError, record: &ErrorRecord) {
    set_last_error(
        record
            .message
            .clone()
            .unwrap_or_else(|| record.to_string()),
    );
    if let Some(out) = out.as_mut() {
        *out = ArbError::from(record);
    }
}

/// Runs `body`, translating an error or a panic into a record in `out`.
///
/// Returns `fallback` on failure. On success `out` is left untouched.
///
/// # Safety
///
/// `out` must be null or valid for writes.
pub(crate) unsafe fn guard<T>(
    out: *mut ArbError,
    fallback: T,
    body: impl FnOnce() -> CoreResult<T>,
) -> T {
    clear_last_error();
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            report(out, &ErrorRecord::from(&err));
            fallback
        }
        Err(payload) => {
            let mut record = ErrorRecord::none();
            record_panic(&*payload, Some(&mut record));
            error!(message = ?record.message, "panic caught at the C boundary");
            report(out, &record);
            fallback
        }
    }
}

/// The error for a null required pointer.
pub(crate) fn null_argument(what: &str) -> CoreError {
    CoreError::invalid_parameter(format!("null {what}"))
}

/// Gets the last error message as a C string.
///
/// Returns null if no error is set.
///
/// # Safety
///
/// The returned pointer is valid until the next FFI call on this thread.
#[no_mangle]
pub extern "C" fn arb_last_error_message() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Clears the last error message.
#[no_mangle]
pub extern "C" fn arb_clear_error() {
    clear_last_error();
}

/// Translates an error record into an HTTP status.
///
/// Success maps to 200.
#[no_mangle]
pub extern "C" fn arb_error_http_status(err: ArbError) -> i32 {
    i32::from(http_status_for(err.domain.into(), err.code))
}

/// Returns the generic code reported when a panic is caught at the boundary.
#[no_mangle]
pub extern "C" fn arb_error_unexpected_code() -> i32 {
    GenericCode::Unexpected as i32
}
