//! Owned byte and string buffers handed to C, plus input readers.

use crate::error::null_argument;
use arbordb_core::{CoreError, CoreResult};
use std::ffi::{c_char, CStr, CString};

/// A byte buffer for FFI.
///
/// Memory is owned by Rust. Call `arb_buffer_free` to release.
#[repr(C)]
#[derive(Debug)]
pub struct ArbBuffer {
    /// Pointer to data.
    pub data: *mut u8,
    /// Length in bytes.
    pub len: usize,
    /// Capacity (for internal use).
    pub capacity: usize,
}

impl ArbBuffer {
    /// Creates a new buffer from a Vec.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let mut vec = vec.into_boxed_slice();
        let data = vec.as_mut_ptr();
        let len = vec.len();
        std::mem::forget(vec);

        Self {
            data,
            len,
            capacity: len,
        }
    }

    /// Creates a buffer holding a copy of `bytes`.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Creates an empty buffer.
    pub fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Returns true if the buffer is null/empty.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Converts back to a Vec, consuming the buffer.
    ///
    /// # Safety
    ///
    /// The buffer must have been created by [`ArbBuffer::from_vec`].
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.data.is_null() {
            return Vec::new();
        }
        Vec::from_raw_parts(self.data, self.len, self.capacity)
    }
}

/// Frees a buffer allocated by ArborDB.
///
/// # Safety
///
/// The buffer must have been allocated by ArborDB FFI functions and not freed
/// before.
#[no_mangle]
pub unsafe extern "C" fn arb_buffer_free(buffer: ArbBuffer) {
    drop(buffer.into_vec());
}

/// A string for FFI.
///
/// Null-terminated UTF-8 string. Memory owned by Rust.
/// Call `arb_string_free` to release.
#[repr(C)]
#[derive(Debug)]
pub struct ArbString {
    /// Pointer to null-terminated string.
    pub ptr: *mut c_char,
    /// Length (not including null terminator).
    pub len: usize,
}

impl ArbString {
    /// Creates a new FFI string from a Rust string.
    ///
    /// Returns `None` if `s` contains a NUL byte.
    pub fn from_str(s: &str) -> Option<Self> {
        let cstring = CString::new(s).ok()?;
        let len = cstring.as_bytes().len();
        let ptr = cstring.into_raw();

        Some(Self { ptr, len })
    }

    /// Like [`from_str`](Self::from_str), failing with an invalid parameter
    /// error that names `what`.
    pub(crate) fn try_from_str(s: &str, what: &str) -> CoreResult<Self> {
        Self::from_str(s)
            .ok_or_else(|| CoreError::invalid_parameter(format!("{what} contains a NUL byte")))
    }

    /// Creates an empty string.
    pub fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Returns true if the string is null.
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Converts to a Rust string slice.
    ///
    /// # Safety
    ///
    /// The pointer must be null or valid.
    pub unsafe fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        CStr::from_ptr(self.ptr).to_str().ok()
    }
}

/// Frees a string allocated by ArborDB.
///
/// # Safety
///
/// The string must have been allocated by ArborDB FFI functions and not freed
/// before.
#[no_mangle]
pub unsafe extern "C" fn arb_string_free(string: ArbString) {
    if !string.ptr.is_null() {
        drop(CString::from_raw(string.ptr));
    }
}

/// Reads a required NUL-terminated UTF-8 argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> CoreResult<&'a str> {
    if ptr.is_null() {
        return Err(null_argument(what));
    }
    read_opt_str(ptr, what).map(|s| s.unwrap_or_default())
}

/// Reads an optional NUL-terminated UTF-8 argument. Null reads as `None`.
///
/// # Safety
///
/// Same as [`read_str`].
pub(crate) unsafe fn read_opt_str<'a>(
    ptr: *const c_char,
    what: &str,
) -> CoreResult<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| CoreError::invalid_parameter(format!("invalid UTF-8 in {what}")))
}

/// Reads a byte range. Null is accepted only with a zero length.
///
/// # Safety
///
/// `data` must be null or valid for `len` bytes that outlive `'a`.
pub(crate) unsafe fn read_bytes<'a>(data: *const u8, len: usize, what: &str) -> CoreResult<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(CoreError::invalid_parameter(format!(
            "null {what} with non-zero length"
        )));
    }
    Ok(std::slice::from_raw_parts(data, len))
}
