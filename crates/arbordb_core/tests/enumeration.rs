//! Enumeration across transactions, purges and privileged callers.

use arbordb_core::internal::enumerate_including_purged;
use arbordb_core::{
    Database, DocEnumerator, DocRange, Document, DocumentFlags, DocumentMeta, EnumFlags,
    EnumeratorOptions, Retained,
};

fn seeded(ids: &[&str]) -> Retained<Database> {
    let db = Database::open_in_memory().unwrap();
    db.begin_transaction().unwrap();
    for id in ids {
        let meta = DocumentMeta::new(DocumentFlags::NONE, &b"1-a"[..]).with_doc_type("note");
        db.put(id, &meta, &b"{}"[..]).unwrap();
    }
    db.end_transaction(true).unwrap();
    db
}

fn collect(e: &DocEnumerator) -> Vec<Document> {
    e.iter().map(Result::unwrap).collect()
}

#[test]
fn purged_documents_need_privilege() {
    let db = seeded(&["a", "b", "c"]);
    db.begin_transaction().unwrap();
    db.purge("b").unwrap();
    db.end_transaction(true).unwrap();

    let public = DocEnumerator::new(&db, &DocRange::all(), EnumeratorOptions::default(), None)
        .unwrap();
    let ids: Vec<String> = collect(&public).into_iter().map(|d| d.doc_id).collect();
    assert_eq!(ids, ["a", "c"]);

    // Raw bits asking for purged documents are dropped
    let sneaky = EnumeratorOptions::with_flags(EnumFlags::from_bits_truncate(0xffff));
    let e = DocEnumerator::new(&db, &DocRange::all(), sneaky, None).unwrap();
    assert!(collect(&e).iter().all(|d| !d.purged));

    let privileged =
        enumerate_including_purged(&db, &DocRange::all(), EnumeratorOptions::default(), None)
            .unwrap();
    let docs = collect(&privileged);
    let seen: Vec<(&str, bool)> = docs.iter().map(|d| (d.doc_id.as_str(), d.purged)).collect();
    assert_eq!(seen, [("a", false), ("b", true), ("c", false)]);
    assert!(docs[1].body.is_none());

    db.compact().unwrap();
    let privileged =
        enumerate_including_purged(&db, &DocRange::all(), EnumeratorOptions::default(), None)
            .unwrap();
    assert_eq!(collect(&privileged).len(), 2);
}

#[test]
fn exhausted_enumerator_keeps_reporting_end() {
    let db = seeded(&["a", "b"]);
    let e = DocEnumerator::new(&db, &DocRange::all(), EnumeratorOptions::default(), None).unwrap();
    assert_eq!(collect(&e).len(), 2);
    for _ in 0..5 {
        assert!(e.advance().unwrap().is_none());
    }
}

#[test]
fn filter_sees_flags_and_type() {
    let db = seeded(&["a", "b"]);
    db.begin_transaction().unwrap();
    let other = DocumentMeta::new(DocumentFlags::NONE, &b"1-z"[..]).with_doc_type("task");
    db.put("c", &other, &b"{}"[..]).unwrap();
    db.end_transaction(true).unwrap();

    let filter = |_: &Document, flags: DocumentFlags, doc_type: Option<&str>| {
        assert!(flags.contains(DocumentFlags::EXISTS));
        doc_type == Some("task")
    };
    let e = DocEnumerator::new(
        &db,
        &DocRange::all(),
        EnumeratorOptions::default(),
        Some(Box::new(filter)),
    )
    .unwrap();
    let ids: Vec<String> = collect(&e).into_iter().map(|d| d.doc_id).collect();
    assert_eq!(ids, ["c"]);
}

#[test]
fn enumerator_keeps_database_alive() {
    let db = seeded(&["a"]);
    let e = DocEnumerator::new(&db, &DocRange::all(), EnumeratorOptions::default(), None).unwrap();
    assert_eq!(Retained::ref_count_value(&db), 2);
    drop(db);
    assert_eq!(Retained::ref_count_value(e.database()), 1);
    assert_eq!(e.advance().unwrap().unwrap().doc_id, "a");
}

#[test]
fn enumeration_counts_in_stats() {
    let db = seeded(&["a"]);
    let _e = DocEnumerator::new(&db, &DocRange::all(), EnumeratorOptions::default(), None)
        .unwrap();
    assert_eq!(db.stats().snapshot().enumerations, 1);
}
