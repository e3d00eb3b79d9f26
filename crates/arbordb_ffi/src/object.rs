//! Reference-counted handles and their retain/release entry points.
//!
//! A handle pointer is an `Arc` leaked with `Arc::into_raw`; it carries one
//! unit of the object's [`RefCount`](arbordb_core::RefCount). Retaining hands
//! out another unit on the same pointer, releasing gives one back.

use crate::types::{ArbDatabase, ArbEnumerator};
use arbordb_core::{live_object_count, Database, DocEnumerator, RefCounted, Retained};
use std::mem::ManuallyDrop;
use std::sync::Arc;

/// Leaks `object` as a boundary handle.
pub(crate) fn into_handle<T: RefCounted, H>(object: Retained<T>) -> *mut H {
    Arc::into_raw(object.into_arc()).cast_mut().cast()
}

/// Views a handle as a `Retained` without taking or giving a reference.
///
/// # Safety
///
/// `handle` must be null or a live handle created by [`into_handle`] for `T`.
pub(crate) unsafe fn borrow_handle<T: RefCounted, H>(
    handle: *const H,
) -> Option<ManuallyDrop<Retained<T>>> {
    if handle.is_null() {
        return None;
    }
    Some(ManuallyDrop::new(Retained::from_arc_owned(Arc::from_raw(
        handle.cast::<T>(),
    ))))
}

/// Adds a reference to a handle and returns it.
///
/// # Safety
///
/// Same as [`borrow_handle`].
pub(crate) unsafe fn retain_handle<T: RefCounted, H>(handle: *mut H) -> *mut H {
    match borrow_handle::<T, H>(handle) {
        Some(object) => into_handle(object.retain()),
        None => handle,
    }
}

/// Gives back one reference. The object is destroyed with its last one.
///
/// # Safety
///
/// Same as [`borrow_handle`]; the caller's reference is gone afterwards.
pub(crate) unsafe fn release_handle<T: RefCounted, H>(handle: *mut H) {
    if let Some(object) = borrow_handle::<T, H>(handle) {
        drop(ManuallyDrop::into_inner(object));
    }
}

/// Adds a reference to a database handle.
///
/// # Returns
///
/// `db`, which now carries one more reference. Null stays null.
///
/// # Safety
///
/// `db` must be null or a live handle from `arb_db_open`.
#[no_mangle]
pub unsafe extern "C" fn arb_db_retain(db: *mut ArbDatabase) -> *mut ArbDatabase {
    retain_handle::<Database, _>(db)
}

/// Releases a reference to a database handle.
///
/// The handle is destroyed with its last reference. Destroying a handle that
/// still has an open transaction aborts the process.
///
/// # Safety
///
/// `db` must be null or a live handle from `arb_db_open`. It must not be used
/// after its last reference is released.
#[no_mangle]
pub unsafe extern "C" fn arb_db_release(db: *mut ArbDatabase) {
    release_handle::<Database, _>(db);
}

/// Adds a reference to an enumerator.
///
/// # Safety
///
/// `e` must be null or a live enumerator.
#[no_mangle]
pub unsafe extern "C" fn arb_enum_retain(e: *mut ArbEnumerator) -> *mut ArbEnumerator {
    retain_handle::<DocEnumerator, _>(e)
}

/// Releases a reference to an enumerator.
///
/// # Safety
///
/// `e` must be null or a live enumerator. It must not be used after its last
/// reference is released.
#[no_mangle]
pub unsafe extern "C" fn arb_enum_release(e: *mut ArbEnumerator) {
    release_handle::<DocEnumerator, _>(e);
}

/// Number of counted objects currently alive in the process.
#[no_mangle]
pub extern "C" fn arb_object_count() -> usize {
    live_object_count()
}

/// Current reference count of a database handle, or 0 for null.
///
/// # Safety
///
/// `db` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn arb_db_ref_count(db: *const ArbDatabase) -> i32 {
    borrow_handle::<Database, _>(db).map_or(0, |db| db.ref_count().get())
}
