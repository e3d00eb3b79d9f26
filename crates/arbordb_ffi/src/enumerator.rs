//! Document enumeration.

use crate::buffer::read_opt_str;
use crate::database::database;
use crate::error::{guard, null_argument, ArbError};
use crate::object::{borrow_handle, into_handle};
use crate::types::{ArbDatabase, ArbDocument, ArbEnumResult, ArbEnumerator, ArbEnumeratorOptions};
use arbordb_core::{
    CoreResult, DocEnumerator, DocRange, Document, DocumentFilter, DocumentFlags, EnumFlags,
    Retained, SequenceNumber,
};
use std::ffi::{c_char, c_void, CString};
use std::mem::ManuallyDrop;
use std::ptr;
use tracing::warn;

/// Filter callback. Returns true to yield the document.
///
/// `doc_type` is null for untyped documents. Both strings are only valid for
/// the duration of the call.
pub type ArbFilterCallback = unsafe extern "C" fn(
    context: *mut c_void,
    doc_id: *const c_char,
    flags: u32,
    doc_type: *const c_char,
) -> bool;

/// Releases a filter context.
pub type ArbFilterDestructor = unsafe extern "C" fn(context: *mut c_void);

/// A foreign document filter.
///
/// Passing a filter hands `context` to the enumerator: `destructor`, if set,
/// is called exactly once when the enumerator is closed or destroyed, or
/// right away if creating it fails.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArbFilter {
    /// The predicate. Null accepts every document.
    pub callback: Option<ArbFilterCallback>,
    /// Opaque caller state passed to both functions.
    pub context: *mut c_void,
    /// Releases `context`. May be null.
    pub destructor: Option<ArbFilterDestructor>,
}

struct ForeignFilter {
    callback: Option<ArbFilterCallback>,
    context: *mut c_void,
    destructor: Option<ArbFilterDestructor>,
}

// Safety: the caller of `arb_db_enumerate_*` promises the context may be used
// from whichever thread advances the enumerator.
unsafe impl Send for ForeignFilter {}

impl DocumentFilter for ForeignFilter {
    fn accept(&mut self, doc: &Document, flags: DocumentFlags, doc_type: Option<&str>) -> bool {
        let Some(callback) = self.callback else {
            return true;
        };
        let Ok(doc_id) = CString::new(doc.doc_id.as_str()) else {
            warn!(doc_id = ?doc.doc_id, "document ID holds NUL; skipped by C filter");
            return false;
        };
        let doc_type = doc_type.and_then(|t| CString::new(t).ok());
        // Safety: the callback and context come from the caller of
        // `arb_db_enumerate_*`
        unsafe {
            callback(
                self.context,
                doc_id.as_ptr(),
                flags.bits(),
                doc_type.as_ref().map_or(ptr::null(), |t| t.as_ptr()),
            )
        }
    }
}

impl Drop for ForeignFilter {
    fn drop(&mut self) {
        if let Some(destructor) = self.destructor {
            // Safety: see `accept`; this is the only call
            unsafe { destructor(self.context) };
        }
    }
}

/// Takes ownership of a foreign filter.
///
/// # Safety
///
/// `filter` must be null or valid.
unsafe fn adopt_filter(filter: *const ArbFilter) -> Option<Box<dyn DocumentFilter>> {
    filter.as_ref().map(|filter| {
        Box::new(ForeignFilter {
            callback: filter.callback,
            context: filter.context,
            destructor: filter.destructor,
        }) as Box<dyn DocumentFilter>
    })
}

/// Reads options, stripping bits only privileged callers may set.
///
/// # Safety
///
/// `options` must be null or valid.
unsafe fn read_options(options: *const ArbEnumeratorOptions) -> ArbEnumeratorOptions {
    let options = options.as_ref().copied().unwrap_or_default();
    if EnumFlags::has_privileged_bits(options.flags) {
        warn!(
            flags = options.flags,
            "privileged enumeration flags are ignored at the C boundary"
        );
    }
    options
}

/// Enumerates documents by ID.
///
/// # Arguments
///
/// * `db` - The database handle
/// * `start` - First document ID in enumeration order, or null for open
/// * `end` - Last document ID in enumeration order, or null for open
/// * `options` - Skip count and flags, or null for the defaults
/// * `filter` - A filter, or null. See `ArbFilter` for ownership.
/// * `out_err` - Error record, filled on failure. May be null.
///
/// # Returns
///
/// An enumerator carrying one reference, or null on failure. Release it with
/// `arb_enum_release`.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `start` and `end` must be null or valid null-terminated UTF-8 strings
/// - `options` and `filter` must be null or valid
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_enumerate_all(
    db: *mut ArbDatabase,
    start: *const c_char,
    end: *const c_char,
    options: *const ArbEnumeratorOptions,
    filter: *const ArbFilter,
    out_err: *mut ArbError,
) -> *mut ArbEnumerator {
    let filter = adopt_filter(filter);
    guard(out_err, ptr::null_mut(), move || {
        let db = database(db)?;
        let range = DocRange::new(
            read_opt_str(start, "start ID")?,
            read_opt_str(end, "end ID")?,
        );
        let options = read_options(options).to_options();
        let e = DocEnumerator::new(&db, &range, options, filter)?;
        Ok(into_handle(e))
    })
}

/// Enumerates committed changes after sequence `since`, oldest first.
///
/// # Safety
///
/// Same as `arb_db_enumerate_all`.
#[no_mangle]
pub unsafe extern "C" fn arb_db_enumerate_changes(
    db: *mut ArbDatabase,
    since: u64,
    options: *const ArbEnumeratorOptions,
    filter: *const ArbFilter,
    out_err: *mut ArbError,
) -> *mut ArbEnumerator {
    let filter = adopt_filter(filter);
    guard(out_err, ptr::null_mut(), move || {
        let db = database(db)?;
        let options = read_options(options).to_options();
        let e = DocEnumerator::changes(&db, SequenceNumber::new(since), options, filter)?;
        Ok(into_handle(e))
    })
}

unsafe fn enumerator(e: *const ArbEnumerator) -> CoreResult<ManuallyDrop<Retained<DocEnumerator>>> {
    borrow_handle::<DocEnumerator, _>(e).ok_or_else(|| null_argument("enumerator"))
}

/// Advances to the next document.
///
/// # Returns
///
/// - `Document` with `out_doc` filled; free it with `arb_document_free`
/// - `End` when there are no more documents, on this and every later call
/// - `Error` with `out_err` filled
///
/// # Safety
///
/// - `e` must be a valid enumerator
/// - `out_doc` must be valid for writes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_enum_next(
    e: *mut ArbEnumerator,
    out_doc: *mut ArbDocument,
    out_err: *mut ArbError,
) -> ArbEnumResult {
    guard(out_err, ArbEnumResult::Error, || {
        let e = enumerator(e)?;
        let out_doc = out_doc
            .as_mut()
            .ok_or_else(|| null_argument("document output"))?;
        match e.advance()? {
            Some(doc) => {
                *out_doc = ArbDocument::from_document(&doc)?;
                Ok(ArbEnumResult::Document)
            }
            None => Ok(ArbEnumResult::End),
        }
    })
}

/// Closes an enumerator, releasing its filter and cursor.
///
/// The enumerator stays valid until released and reports `End` from then on.
///
/// # Safety
///
/// `e` must be null or a valid enumerator.
#[no_mangle]
pub unsafe extern "C" fn arb_enum_close(e: *mut ArbEnumerator) {
    guard(ptr::null_mut(), (), || {
        enumerator(e)?.close();
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        arb_db_begin_transaction, arb_db_end_transaction, arb_db_open_memory, arb_db_put,
    };
    use crate::object::{arb_db_release, arb_enum_release};
    use crate::types::{arb_document_free, ArbDocumentMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    unsafe fn seeded(ids: &[&str]) -> *mut ArbDatabase {
        let db = arb_db_open_memory(ptr::null_mut());
        let meta = ArbDocumentMeta {
            flags: 0,
            rev_id: b"1-a".as_ptr(),
            rev_id_len: 3,
            doc_type: ptr::null(),
        };
        assert!(arb_db_begin_transaction(db, ptr::null_mut()));
        for id in ids {
            let id = CString::new(*id).unwrap();
            assert!(arb_db_put(db, id.as_ptr(), &meta, b"{}".as_ptr(), 2, ptr::null_mut()));
        }
        assert!(arb_db_end_transaction(db, true, ptr::null_mut()));
        db
    }

    unsafe fn drain(e: *mut ArbEnumerator) -> Vec<String> {
        let mut ids = Vec::new();
        let mut doc = ArbDocument::empty();
        while arb_enum_next(e, &mut doc, ptr::null_mut()) == ArbEnumResult::Document {
            ids.push(doc.doc_id.as_str().unwrap().to_string());
            arb_document_free(&mut doc);
        }
        ids
    }

    #[test]
    fn enumerates_range() {
        unsafe {
            let db = seeded(&["a", "b", "c", "d"]);
            let start = CString::new("b").unwrap();
            let end = CString::new("c").unwrap();
            let mut err = ArbError::none();
            let e = arb_db_enumerate_all(
                db,
                start.as_ptr(),
                end.as_ptr(),
                ptr::null(),
                ptr::null(),
                &mut err,
            );
            assert!(!e.is_null());
            assert_eq!(drain(e), ["b", "c"]);

            let mut doc = ArbDocument::empty();
            assert_eq!(arb_enum_next(e, &mut doc, &mut err), ArbEnumResult::End);
            assert!(!err.is_error());

            arb_enum_release(e);
            arb_db_release(db);
        }
    }

    struct Probe {
        calls: u32,
        destroyed: Arc<AtomicUsize>,
    }

    fn probe_filter(callback: Option<ArbFilterCallback>) -> (ArbFilter, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let probe = Box::new(Probe {
            calls: 0,
            destroyed: Arc::clone(&destroyed),
        });
        let filter = ArbFilter {
            callback,
            context: Box::into_raw(probe).cast(),
            destructor: Some(free_probe),
        };
        (filter, destroyed)
    }

    unsafe extern "C" fn only_b(
        context: *mut c_void,
        doc_id: *const c_char,
        _flags: u32,
        _doc_type: *const c_char,
    ) -> bool {
        (*context.cast::<Probe>()).calls += 1;
        std::ffi::CStr::from_ptr(doc_id).to_bytes() == b"b"
    }

    unsafe extern "C" fn free_probe(context: *mut c_void) {
        let probe = Box::from_raw(context.cast::<Probe>());
        probe.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn filter_runs_and_is_destroyed_on_close() {
        unsafe {
            let db = seeded(&["a", "b", "c"]);
            let (filter, destroyed) = probe_filter(Some(only_b));
            let e = arb_db_enumerate_all(
                db,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &filter,
                ptr::null_mut(),
            );
            assert_eq!((*filter.context.cast::<Probe>()).calls, 0);
            assert_eq!(drain(e), ["b"]);
            assert_eq!((*filter.context.cast::<Probe>()).calls, 3);

            arb_enum_close(e);
            assert_eq!(destroyed.load(Ordering::SeqCst), 1);
            let mut doc = ArbDocument::empty();
            assert_eq!(arb_enum_next(e, &mut doc, ptr::null_mut()), ArbEnumResult::End);

            arb_enum_release(e);
            arb_db_release(db);
            assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        }
    }

    unsafe extern "C" fn accept_all(
        context: *mut c_void,
        _doc_id: *const c_char,
        _flags: u32,
        _doc_type: *const c_char,
    ) -> bool {
        (*context.cast::<Probe>()).calls += 1;
        true
    }

    #[test]
    fn ids_with_nul_are_skipped_by_foreign_filter() {
        unsafe {
            let core_db = arbordb_core::Database::open_in_memory().unwrap();
            let meta = arbordb_core::DocumentMeta::new(DocumentFlags::NONE, &b"1-a"[..]);
            core_db.begin_transaction().unwrap();
            core_db.put("a\0b", &meta, &b"{}"[..]).unwrap();
            core_db.put("c", &meta, &b"{}"[..]).unwrap();
            core_db.end_transaction(true).unwrap();
            let db: *mut ArbDatabase = into_handle(core_db);

            let (filter, destroyed) = probe_filter(Some(accept_all));
            let e = arb_db_enumerate_all(
                db,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &filter,
                ptr::null_mut(),
            );
            assert!(!e.is_null());
            assert_eq!(drain(e), ["c"]);
            assert_eq!((*filter.context.cast::<Probe>()).calls, 1);

            arb_enum_release(e);
            arb_db_release(db);
            assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn failed_creation_still_destroys_filter() {
        unsafe {
            let (filter, destroyed) = probe_filter(None);
            let mut err = ArbError::none();
            let e = arb_db_enumerate_all(
                ptr::null_mut(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &filter,
                &mut err,
            );
            assert!(e.is_null());
            assert!(err.is_error());
            assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn privileged_flag_is_stripped() {
        unsafe {
            let db = seeded(&["a", "b"]);
            let id = CString::new("a").unwrap();
            assert!(arb_db_begin_transaction(db, ptr::null_mut()));
            assert!(crate::database::arb_db_purge(db, id.as_ptr(), ptr::null_mut()));
            assert!(arb_db_end_transaction(db, true, ptr::null_mut()));

            let options = ArbEnumeratorOptions {
                skip: 0,
                flags: EnumFlags::DEFAULT.bits() | 0x8000,
            };
            let e = arb_db_enumerate_all(
                db,
                ptr::null(),
                ptr::null(),
                &options,
                ptr::null(),
                ptr::null_mut(),
            );
            assert_eq!(drain(e), ["b"]);
            arb_enum_release(e);
            arb_db_release(db);
        }
    }

    #[test]
    fn changes_follow_sequence() {
        unsafe {
            let db = seeded(&["b", "a"]);
            let e = arb_db_enumerate_changes(
                db,
                0,
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            );
            assert_eq!(drain(e).len(), 2);
            arb_enum_release(e);

            let e = arb_db_enumerate_changes(
                db,
                2,
                ptr::null(),
                ptr::null(),
                ptr::null_mut(),
            );
            assert!(drain(e).is_empty());
            arb_enum_release(e);
            arb_db_release(db);
        }
    }
}
