//! Database handle operations.

use crate::buffer::{read_bytes, read_str};
use crate::error::{clear_last_error, guard, null_argument, set_last_error, ArbError};
use crate::object::{borrow_handle, into_handle};
use crate::types::{
    encryption_config, ArbDatabase, ArbDatabaseConfig, ArbDocument, ArbDocumentMeta, ArbStats,
};
use arbordb_core::{Config, CoreError, CoreResult, Database, Retained};
use std::ffi::c_char;
use std::mem::ManuallyDrop;
use std::ptr;

/// Resolves a handle argument.
///
/// # Safety
///
/// `db` must be null or a live database handle.
pub(crate) unsafe fn database(db: *const ArbDatabase) -> CoreResult<ManuallyDrop<Retained<Database>>> {
    borrow_handle::<Database, _>(db).ok_or_else(|| null_argument("database handle"))
}

/// Opens a database directory.
///
/// # Arguments
///
/// * `path` - Null-terminated path of the database directory
/// * `config` - Configuration, or null for the defaults
/// * `out_err` - Error record, filled on failure. May be null.
///
/// # Returns
///
/// A handle carrying one reference, or null on failure. Release it with
/// `arb_db_release`.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string
/// - `config` must be null or valid, with a key pointer valid for its length
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_open(
    path: *const c_char,
    config: *const ArbDatabaseConfig,
    out_err: *mut ArbError,
) -> *mut ArbDatabase {
    guard(out_err, ptr::null_mut(), || {
        let path = read_str(path, "path")?;
        let config = match config.as_ref() {
            Some(config) => config.to_config()?,
            None => Config::default(),
        };
        Ok(into_handle(Database::open(path, config)?))
    })
}

/// Opens a database that lives only in memory.
///
/// # Safety
///
/// `out_err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn arb_db_open_memory(out_err: *mut ArbError) -> *mut ArbDatabase {
    guard(out_err, ptr::null_mut(), || {
        Ok(into_handle(Database::open_in_memory()?))
    })
}

/// Begins a transaction, or nests one level deeper in the calling thread's
/// open transaction.
///
/// Blocks while another thread owns an open transaction on this handle.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_begin_transaction(
    db: *mut ArbDatabase,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        database(db)?.begin_transaction()?;
        Ok(true)
    })
}

/// Ends one transaction level.
///
/// The outermost end commits if `commit` is true and no inner level aborted;
/// otherwise the whole transaction is rolled back.
///
/// # Returns
///
/// `true` on success. An outermost commit of a transaction doomed by an inner
/// abort rolls back and returns `false` with a `TransactionAborted` record.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_end_transaction(
    db: *mut ArbDatabase,
    commit: bool,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        database(db)?.end_transaction(commit)?;
        Ok(true)
    })
}

/// Returns true if a transaction is open on the handle.
///
/// # Safety
///
/// `db` must be null or a valid database handle.
#[no_mangle]
pub unsafe extern "C" fn arb_db_is_in_transaction(db: *mut ArbDatabase) -> bool {
    clear_last_error();
    match database(db) {
        Ok(db) => db.is_in_transaction(),
        Err(e) => {
            set_last_error(e.to_string());
            false
        }
    }
}

/// Returns the transaction nesting level, or 0 for a null handle.
///
/// # Safety
///
/// `db` must be null or a valid database handle.
#[no_mangle]
pub unsafe extern "C" fn arb_db_transaction_level(db: *mut ArbDatabase) -> u32 {
    database(db).map_or(0, |db| db.transaction_level())
}

/// Writes a document in the calling thread's open transaction.
///
/// # Arguments
///
/// * `db` - The database handle
/// * `doc_id` - Null-terminated document ID
/// * `meta` - Revision metadata
/// * `body` - Pointer to the body
/// * `body_len` - Length of the body
/// * `out_err` - Error record, filled on failure. May be null.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `doc_id` must be a valid null-terminated UTF-8 string
/// - `meta` must be valid, with its pointers valid as documented on
///   `ArbDocumentMeta`
/// - `body` must be valid for `body_len` bytes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_put(
    db: *mut ArbDatabase,
    doc_id: *const c_char,
    meta: *const ArbDocumentMeta,
    body: *const u8,
    body_len: usize,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let db = database(db)?;
        let doc_id = read_str(doc_id, "document ID")?;
        let meta = meta
            .as_ref()
            .ok_or_else(|| null_argument("metadata"))?
            .to_meta()?;
        let body = read_bytes(body, body_len, "body")?;
        db.put(doc_id, &meta, body.to_vec())?;
        Ok(true)
    })
}

/// Reads a document.
///
/// Inside a transaction the calling thread sees its own uncommitted writes.
///
/// # Returns
///
/// `true` with `out_doc` filled, or `false` with a `NotFound` record if the
/// document does not exist. Free the document with `arb_document_free`.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `doc_id` must be a valid null-terminated UTF-8 string
/// - `out_doc` must be valid for writes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_get(
    db: *mut ArbDatabase,
    doc_id: *const c_char,
    with_body: bool,
    out_doc: *mut ArbDocument,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let db = database(db)?;
        let doc_id = read_str(doc_id, "document ID")?;
        let out_doc = out_doc
            .as_mut()
            .ok_or_else(|| null_argument("document output"))?;
        let doc = db
            .get(doc_id, with_body)?
            .ok_or_else(|| CoreError::not_found(doc_id))?;
        *out_doc = ArbDocument::from_document(&doc)?;
        Ok(true)
    })
}

/// Purges a document in the calling thread's open transaction.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `doc_id` must be a valid null-terminated UTF-8 string
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_purge(
    db: *mut ArbDatabase,
    doc_id: *const c_char,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        database(db)?.purge(read_str(doc_id, "document ID")?)?;
        Ok(true)
    })
}

/// Counts committed, live documents.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_count` must be valid for writes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_document_count(
    db: *mut ArbDatabase,
    out_count: *mut u64,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let db = database(db)?;
        let out_count = out_count
            .as_mut()
            .ok_or_else(|| null_argument("count output"))?;
        *out_count = db.document_count()? as u64;
        Ok(true)
    })
}

/// Reads the sequence of the last committed change.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_sequence` must be valid for writes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_last_sequence(
    db: *mut ArbDatabase,
    out_sequence: *mut u64,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let db = database(db)?;
        let out_sequence = out_sequence
            .as_mut()
            .ok_or_else(|| null_argument("sequence output"))?;
        *out_sequence = db.last_sequence()?.as_u64();
        Ok(true)
    })
}

/// Copies the handle's statistics into `out_stats`.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_stats` must be valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_stats(db: *mut ArbDatabase, out_stats: *mut ArbStats) -> bool {
    guard(ptr::null_mut(), false, || {
        let db = database(db)?;
        let out_stats = out_stats
            .as_mut()
            .ok_or_else(|| null_argument("stats output"))?;
        *out_stats = ArbStats::from(db.stats().snapshot());
        Ok(true)
    })
}

/// Closes the handle's storage. Refused while a transaction is open.
///
/// The handle itself stays valid until released; later operations report
/// `NotOpen`. Closing twice is a no-op.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_close(db: *mut ArbDatabase, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        database(db)?.close()?;
        Ok(true)
    })
}

/// Drops purged documents from storage. Refused while a transaction is open.
///
/// # Arguments
///
/// * `out_removed` - Receives the number of records dropped. May be null.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_removed` and `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_compact(
    db: *mut ArbDatabase,
    out_removed: *mut u64,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let removed = database(db)?.compact()?;
        if let Some(out_removed) = out_removed.as_mut() {
            *out_removed = removed as u64;
        }
        Ok(true)
    })
}

/// Re-seals the database with a new key, or removes encryption with
/// algorithm 0 and no key. Refused while a transaction is open.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `key` must be null or valid for `key_len` bytes
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_rekey(
    db: *mut ArbDatabase,
    algorithm: u32,
    key: *const u8,
    key_len: usize,
    out_err: *mut ArbError,
) -> bool {
    guard(out_err, false, || {
        let db = database(db)?;
        db.rekey(&encryption_config(algorithm, key, key_len)?)?;
        Ok(true)
    })
}

/// Closes the handle and deletes its files. Refused while a transaction is
/// open.
///
/// # Safety
///
/// - `db` must be a valid database handle
/// - `out_err` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn arb_db_delete(db: *mut ArbDatabase, out_err: *mut ArbError) -> bool {
    guard(out_err, false, || {
        database(db)?.delete_database()?;
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArbErrorDomain;
    use crate::object::arb_db_release;
    use crate::types::arb_document_free;
    use arbordb_core::GenericCode;
    use std::ffi::CString;

    fn meta() -> ArbDocumentMeta {
        ArbDocumentMeta {
            flags: 0,
            rev_id: b"1-a".as_ptr(),
            rev_id_len: 3,
            doc_type: ptr::null(),
        }
    }

    #[test]
    fn put_get_round_trip() {
        unsafe {
            let mut err = ArbError::none();
            let db = arb_db_open_memory(&mut err);
            assert!(!db.is_null());

            let id = CString::new("doc1").unwrap();
            let body = b"{\"n\":1}";
            assert!(arb_db_begin_transaction(db, &mut err));
            assert!(arb_db_is_in_transaction(db));
            assert!(arb_db_put(db, id.as_ptr(), &meta(), body.as_ptr(), body.len(), &mut err));
            assert!(arb_db_end_transaction(db, true, &mut err));
            assert!(!err.is_error());

            let mut doc = ArbDocument::empty();
            assert!(arb_db_get(db, id.as_ptr(), true, &mut doc, &mut err));
            assert_eq!(doc.doc_id.as_str(), Some("doc1"));
            assert_eq!(doc.sequence, 1);
            assert_eq!(doc.body.len, body.len());
            arb_document_free(&mut doc);

            let mut count = 0;
            assert!(arb_db_document_count(db, &mut count, &mut err));
            assert_eq!(count, 1);

            arb_db_release(db);
        }
    }

    #[test]
    fn missing_document_reports_not_found() {
        unsafe {
            let db = arb_db_open_memory(ptr::null_mut());
            let id = CString::new("ghost").unwrap();
            let mut doc = ArbDocument::empty();
            let mut err = ArbError::none();
            assert!(!arb_db_get(db, id.as_ptr(), false, &mut doc, &mut err));
            assert_eq!(err.domain, ArbErrorDomain::Generic);
            assert_eq!(err.code, GenericCode::NotFound as i32);
            arb_db_release(db);
        }
    }

    #[test]
    fn write_outside_transaction_is_refused() {
        unsafe {
            let db = arb_db_open_memory(ptr::null_mut());
            let id = CString::new("doc1").unwrap();
            let mut err = ArbError::none();
            assert!(!arb_db_put(db, id.as_ptr(), &meta(), ptr::null(), 0, &mut err));
            assert_eq!(err.code, GenericCode::NotInTransaction as i32);
            arb_db_release(db);
        }
    }

    #[test]
    fn null_arguments_fill_the_record() {
        unsafe {
            let mut err = ArbError::none();
            assert!(!arb_db_begin_transaction(ptr::null_mut(), &mut err));
            assert_eq!(err.code, GenericCode::InvalidParameter as i32);
            assert!(!arb_db_is_in_transaction(ptr::null_mut()));
            assert!(arb_db_open(ptr::null(), ptr::null(), &mut err).is_null());
        }
    }

    #[test]
    fn file_database_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("db").to_str().unwrap()).unwrap();
        unsafe {
            let mut err = ArbError::none();
            let config = ArbDatabaseConfig {
                sync_on_commit: false,
                ..ArbDatabaseConfig::default()
            };
            let db = arb_db_open(path.as_ptr(), &config, &mut err);
            assert!(!db.is_null(), "{err:?}");

            let id = CString::new("a").unwrap();
            assert!(arb_db_begin_transaction(db, &mut err));
            assert!(arb_db_put(db, id.as_ptr(), &meta(), ptr::null(), 0, &mut err));
            assert!(!arb_db_close(db, &mut err));
            assert_eq!(err.code, GenericCode::TransactionNotClosed as i32);
            assert!(arb_db_end_transaction(db, true, &mut err));

            let mut seq = 0;
            assert!(arb_db_last_sequence(db, &mut seq, &mut err));
            assert_eq!(seq, 1);

            let mut stats = ArbStats::default();
            assert!(arb_db_stats(db, &mut stats));
            assert_eq!(stats.writes, 1);
            assert_eq!(stats.transactions_committed, 1);

            assert!(arb_db_close(db, &mut err));
            assert!(arb_db_close(db, &mut err));
            arb_db_release(db);
        }
    }
}
