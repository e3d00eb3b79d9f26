//! Ordered-key builder and key/value lists.
//!
//! Keys and lists are plain owned objects: create with `*_new`, destroy with
//! `*_free`. Both are tracked by `arb_object_count`.

use crate::buffer::{read_bytes, read_str, ArbBuffer, ArbString};
use crate::error::{guard, null_argument, ArbError};
use crate::types::{ArbKey, ArbKeyValueList};
use arbordb_codec::{CodecError, CollatedKey, KeyBuilder, KeyValueList, Value};
use arbordb_core::{CoreError, CoreResult, InstanceCounted};
use std::cmp::Ordering;
use std::ffi::c_char;
use std::ptr;

struct KeyHandle {
    builder: KeyBuilder,
    _instance: InstanceCounted,
}

impl KeyHandle {
    fn new(builder: KeyBuilder) -> Self {
        Self {
            builder,
            _instance: InstanceCounted::new(),
        }
    }

    /// The finished key, refusing open containers.
    fn collated(&self) -> CoreResult<CollatedKey> {
        if self.builder.depth() > 0 {
            return Err(CodecError::unbalanced(format!(
                "{} container(s) still open",
                self.builder.depth()
            ))
            .into());
        }
        Ok(CollatedKey::from_raw(self.builder.as_bytes().to_vec()))
    }
}

struct ListHandle {
    list: KeyValueList,
    _instance: InstanceCounted,
}

unsafe fn key<'a>(key: *mut ArbKey) -> CoreResult<&'a mut KeyHandle> {
    key.cast::<KeyHandle>()
        .as_mut()
        .ok_or_else(|| null_argument("key"))
}

unsafe fn list<'a>(list: *mut ArbKeyValueList) -> CoreResult<&'a mut ListHandle> {
    list.cast::<ListHandle>()
        .as_mut()
        .ok_or_else(|| null_argument("key/value list"))
}

fn into_raw_key(handle: KeyHandle) -> *mut ArbKey {
    Box::into_raw(Box::new(handle)).cast()
}

/// Creates an empty key builder.
///
/// # Safety
///
/// Always safe to call; free the result with `arb_key_free`.
#[no_mangle]
pub unsafe extern "C" fn arb_key_new() -> *mut ArbKey {
    guard(ptr::null_mut(), ptr::null_mut(), || {
        Ok(into_raw_key(KeyHandle::new(KeyBuilder::new())))
    })
}

/// Creates a key builder holding already-encoded bytes verbatim.
///
/// The bytes are not validated; malformed input surfaces when the key is
/// read, for example by `arb_key_to_json`.
///
/// # Safety
///
/// - `data` must be valid for `len` bytes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_key_with_bytes(
    data: *const u8,
    len: usize,
    out_err: *mut ArbError,
) -> *mut ArbKey {
    guard(out_err, ptr::null_mut(), || {
        let bytes = read_bytes(data, len, "key bytes")?;
        Ok(into_raw_key(KeyHandle::new(KeyBuilder::from_encoded(bytes))))
    })
}

/// Frees a key builder.
///
/// # Safety
///
/// `key` must be null or a builder from `arb_key_new`/`arb_key_with_bytes`
/// that was not freed before.
#[no_mangle]
pub unsafe extern "C" fn arb_key_free(key: *mut ArbKey) {
    if !key.is_null() {
        drop(Box::from_raw(key.cast::<KeyHandle>()));
    }
}

/// Appends a null.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_add_null(key: *mut ArbKey, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.add_null();
        Ok(true)
    })
}

/// Appends a boolean.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_add_bool(
    key: *mut ArbKey,
    value: bool,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.add_bool(value);
        Ok(true)
    })
}

/// Appends a number. NaN is refused with an encoding error.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_add_number(
    key: *mut ArbKey,
    value: f64,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.add_number(value)?;
        Ok(true)
    })
}

/// Appends a UTF-8 string of `len` bytes. Embedded NULs are allowed.
///
/// # Safety
///
/// - `key` must be a valid builder
/// - `text` must be valid for `len` bytes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_key_add_string(
    key: *mut ArbKey,
    text: *const u8,
    len: usize,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let key = self::key(key)?;
        let text = std::str::from_utf8(read_bytes(text, len, "string")?)
            .map_err(|_| CoreError::invalid_parameter("invalid UTF-8 in key string"))?;
        key.builder.add_string(text);
        Ok(true)
    })
}

/// Appends a value given as JSON text.
///
/// # Safety
///
/// - `key` must be a valid builder
/// - `json` must be a valid null-terminated UTF-8 string
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_key_add_json(
    key: *mut ArbKey,
    json: *const c_char,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let key = self::key(key)?;
        let value = Value::parse_json(read_str(json, "JSON")?)?;
        key.builder.add_value(&value)?;
        Ok(true)
    })
}

/// Opens an array. Following values become its elements.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_begin_array(key: *mut ArbKey, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.begin_array();
        Ok(true)
    })
}

/// Closes the innermost array.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_end_array(key: *mut ArbKey, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.end_array()?;
        Ok(true)
    })
}

/// Opens a map. Following values alternate between keys and values.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_begin_map(key: *mut ArbKey, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.begin_map();
        Ok(true)
    })
}

/// Closes the innermost map. Duplicate keys are refused.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_end_map(key: *mut ArbKey, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        self::key(key)?.builder.end_map()?;
        Ok(true)
    })
}

/// Copies the encoded bytes of a finished key.
///
/// # Returns
///
/// The bytes, or an empty buffer on failure. Free with `arb_buffer_free`.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_bytes(key: *mut ArbKey, out_err: *mut ArbError) -> ArbBuffer {
    guard(out_err, ArbBuffer::empty(), || {
        Ok(ArbBuffer::copy_from(self::key(key)?.collated()?.as_bytes()))
    })
}

/// Renders a finished key as JSON text.
///
/// # Returns
///
/// The text, or a null string on failure. Free with `arb_string_free`.
///
/// # Safety
///
/// `key` must be a valid builder; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_key_to_json(key: *mut ArbKey, out_err: *mut ArbError) -> ArbString {
    guard(out_err, ArbString::empty(), || {
        let json = self::key(key)?.collated()?.to_json()?;
        ArbString::try_from_str(&json, "JSON")
    })
}

/// Sort position of a possibly unfinished builder.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum CompareRank {
    Null,
    Finished(CollatedKey),
    Open,
}

impl CompareRank {
    unsafe fn of(key: *const ArbKey) -> Self {
        match key.cast::<KeyHandle>().as_ref() {
            None => CompareRank::Null,
            Some(handle) => handle
                .collated()
                .map_or(CompareRank::Open, CompareRank::Finished),
        }
    }
}

/// Compares two keys in collation order.
///
/// # Returns
///
/// A negative number, zero or a positive number. A null key sorts first and
/// a builder with open containers sorts after every finished key; two open
/// builders compare equal.
///
/// # Safety
///
/// `a` and `b` must be null or valid builders.
#[no_mangle]
pub unsafe extern "C" fn arb_key_compare(a: *const ArbKey, b: *const ArbKey) -> i32 {
    match CompareRank::of(a).cmp(&CompareRank::of(b)) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Creates an empty key/value list.
///
/// # Safety
///
/// Always safe to call; free the result with `arb_kv_list_free`.
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_new() -> *mut ArbKeyValueList {
    guard(ptr::null_mut(), ptr::null_mut(), || {
        let handle = ListHandle {
            list: KeyValueList::new(),
            _instance: InstanceCounted::new(),
        };
        Ok(Box::into_raw(Box::new(handle)).cast())
    })
}

/// Frees a key/value list.
///
/// # Safety
///
/// `list` must be null or a list from `arb_kv_list_new` that was not freed
/// before.
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_free(list: *mut ArbKeyValueList) {
    if !list.is_null() {
        drop(Box::from_raw(list.cast::<ListHandle>()));
    }
}

/// Appends a copy of a finished key and a value.
///
/// # Safety
///
/// - `list` and `key` must be valid
/// - `value` must be valid for `value_len` bytes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_add(
    list: *mut ArbKeyValueList,
    key: *mut ArbKey,
    value: *const u8,
    value_len: usize,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let list = self::list(list)?;
        let key = self::key(key)?.collated()?;
        let value = read_bytes(value, value_len, "value")?;
        list.list.add(key, value.to_vec());
        Ok(true)
    })
}

/// Number of pairs in a list, or 0 for null.
///
/// # Safety
///
/// `list` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_count(list: *mut ArbKeyValueList) -> usize {
    self::list(list).map_or(0, |list| list.list.len())
}

/// Copies the encoded key at `index`.
///
/// # Safety
///
/// `list` must be valid; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_key(
    list: *mut ArbKeyValueList,
    index: usize,
    out_err: *mut ArbError,
) -> ArbBuffer {
    guard(out_err, ArbBuffer::empty(), || {
        let key = self::list(list)?
            .list
            .key(index)
            .ok_or_else(|| CoreError::invalid_parameter(format!("index {index} out of range")))?;
        Ok(ArbBuffer::copy_from(key.as_bytes()))
    })
}

/// Copies the value at `index`.
///
/// # Safety
///
/// `list` must be valid; `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_kv_list_value(
    list: *mut ArbKeyValueList,
    index: usize,
    out_err: *mut ArbError,
) -> ArbBuffer {
    guard(out_err, ArbBuffer::empty(), || {
        let value = self::list(list)?
            .list
            .value(index)
            .ok_or_else(|| CoreError::invalid_parameter(format!("index {index} out of range")))?;
        Ok(ArbBuffer::copy_from(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{arb_buffer_free, arb_string_free};
    use crate::error::ArbErrorDomain;
    use arbordb_core::GenericCode;
    use std::ffi::CString;

    unsafe fn json(key: *mut ArbKey) -> String {
        let text = arb_key_to_json(key, ptr::null_mut());
        let out = text.as_str().unwrap().to_string();
        arb_string_free(text);
        out
    }

    #[test]
    fn builds_compound_key() {
        unsafe {
            let mut err = ArbError::none();
            let key = arb_key_new();
            assert!(arb_key_begin_array(key, &mut err));
            assert!(arb_key_add_string(key, b"user".as_ptr(), 4, &mut err));
            assert!(arb_key_add_number(key, 42.0, &mut err));
            assert!(arb_key_add_null(key, &mut err));
            assert!(arb_key_end_array(key, &mut err));
            assert_eq!(json(key), r#"["user",42,null]"#);
            arb_key_free(key);
        }
    }

    #[test]
    fn nan_is_an_encoding_error() {
        unsafe {
            let mut err = ArbError::none();
            let key = arb_key_new();
            assert!(!arb_key_add_number(key, f64::NAN, &mut err));
            assert_eq!(err.domain, ArbErrorDomain::Generic);
            assert_eq!(err.code, GenericCode::EncodingFailed as i32);
            arb_key_free(key);
        }
    }

    #[test]
    fn open_container_is_unbalanced() {
        unsafe {
            let mut err = ArbError::none();
            let key = arb_key_new();
            arb_key_begin_map(key, &mut err);
            let buffer = arb_key_bytes(key, &mut err);
            assert!(buffer.is_null());
            assert_eq!(err.code, GenericCode::EncodingFailed as i32);
            arb_key_free(key);
        }
    }

    #[test]
    fn raw_wrap_matches_fresh_encoding() {
        unsafe {
            let fresh = arb_key_new();
            let json_text = CString::new(r#"{"a":[1,true]}"#).unwrap();
            assert!(arb_key_add_json(fresh, json_text.as_ptr(), ptr::null_mut()));
            let bytes = arb_key_bytes(fresh, ptr::null_mut());

            let wrapped = arb_key_with_bytes(bytes.data, bytes.len, ptr::null_mut());
            assert_eq!(arb_key_compare(fresh, wrapped), 0);
            assert_eq!(json(wrapped), json(fresh));

            arb_buffer_free(bytes);
            arb_key_free(fresh);
            arb_key_free(wrapped);
        }
    }

    #[test]
    fn malformed_raw_bytes_fail_on_read() {
        unsafe {
            let mut err = ArbError::none();
            let key = arb_key_with_bytes([0xffu8, 0x01].as_ptr(), 2, &mut err);
            assert!(!key.is_null());
            let text = arb_key_to_json(key, &mut err);
            assert!(text.is_null());
            assert!(err.is_error());
            arb_key_free(key);
        }
    }

    #[test]
    fn deeply_nested_raw_bytes_fail_on_read() {
        unsafe {
            let mut err = ArbError::none();
            let deep = vec![0x06u8; 100_000];
            let key = arb_key_with_bytes(deep.as_ptr(), deep.len(), &mut err);
            assert!(!key.is_null());
            let text = arb_key_to_json(key, &mut err);
            assert!(text.is_null());
            assert_eq!(err.domain, ArbErrorDomain::Generic);
            assert_eq!(err.code, GenericCode::EncodingFailed as i32);
            arb_key_free(key);
        }
    }

    #[test]
    fn open_builders_sort_after_finished_keys() {
        unsafe {
            let finished = arb_key_new();
            arb_key_begin_array(finished, ptr::null_mut());
            arb_key_add_number(finished, 1.0, ptr::null_mut());
            arb_key_end_array(finished, ptr::null_mut());

            let open = arb_key_new();
            arb_key_begin_array(open, ptr::null_mut());
            arb_key_add_number(open, 1.0, ptr::null_mut());
            let other_open = arb_key_new();
            arb_key_begin_map(other_open, ptr::null_mut());

            assert_eq!(arb_key_compare(finished, open), -1);
            assert_eq!(arb_key_compare(open, finished), 1);
            assert_eq!(arb_key_compare(open, other_open), 0);
            assert_eq!(arb_key_compare(ptr::null(), open), -1);

            arb_key_end_array(open, ptr::null_mut());
            assert_eq!(arb_key_compare(finished, open), 0);

            arb_key_free(finished);
            arb_key_free(open);
            arb_key_free(other_open);
        }
    }

    #[test]
    fn compare_follows_collation() {
        unsafe {
            let small = arb_key_new();
            let large = arb_key_new();
            arb_key_add_bool(small, true, ptr::null_mut());
            arb_key_add_number(large, -5.0, ptr::null_mut());
            assert_eq!(arb_key_compare(small, large), -1);
            assert_eq!(arb_key_compare(large, small), 1);
            assert_eq!(arb_key_compare(ptr::null(), small), -1);
            arb_key_free(small);
            arb_key_free(large);
        }
    }

    #[test]
    fn key_value_list() {
        unsafe {
            let mut err = ArbError::none();
            let list = arb_kv_list_new();
            let key = arb_key_new();
            arb_key_add_string(key, b"k".as_ptr(), 1, &mut err);
            assert!(arb_kv_list_add(list, key, b"v1".as_ptr(), 2, &mut err));
            assert_eq!(arb_kv_list_count(list), 1);

            let value = arb_kv_list_value(list, 0, &mut err);
            assert_eq!(value.into_vec(), b"v1");
            let stored = arb_kv_list_key(list, 0, &mut err);
            let expected = arb_key_bytes(key, &mut err);
            assert_eq!(stored.into_vec(), expected.into_vec());

            assert!(arb_kv_list_value(list, 5, &mut err).is_null());
            assert_eq!(err.code, GenericCode::InvalidParameter as i32);

            arb_key_free(key);
            arb_kv_list_free(list);
        }
    }
}
