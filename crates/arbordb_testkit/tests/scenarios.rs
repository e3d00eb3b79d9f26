//! Handle scenarios over generated operation sequences.

use arbordb_core::{Database, DocEnumerator, DocRange, EnumFlags, EnumeratorOptions, Retained};
use arbordb_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn model(ops: &[DocOperation], mut live: BTreeSet<String>) -> BTreeSet<String> {
    for op in ops {
        match op {
            DocOperation::Put { doc_id, .. } => {
                live.insert(doc_id.clone());
            }
            DocOperation::Purge { doc_id } => {
                live.remove(doc_id);
            }
        }
    }
    live
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn committed_operations_match_model(
        first in operation_sequence_strategy(1, 12),
        second in operation_sequence_strategy(1, 12),
    ) {
        let test_db = TestDatabase::memory();
        apply_operations(&test_db, &first, true).unwrap();
        apply_operations(&test_db, &second, true).unwrap();

        let expected = model(&second, model(&first, BTreeSet::new()));
        let actual: BTreeSet<String> = enumerate_ids(&test_db).unwrap().into_iter().collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(!test_db.is_in_transaction());
    }

    #[test]
    fn aborted_operations_change_nothing(
        first in operation_sequence_strategy(1, 12),
        second in operation_sequence_strategy(1, 12),
    ) {
        let test_db = TestDatabase::memory();
        apply_operations(&test_db, &first, true).unwrap();
        let before = enumerate_ids(&test_db).unwrap();
        apply_operations(&test_db, &second, false).unwrap();
        prop_assert_eq!(enumerate_ids(&test_db).unwrap(), before);
    }

    #[test]
    fn descending_is_reverse_of_ascending(count in 0usize..20) {
        let test_db = scenarios::populated_database(count);
        let mut ascending = enumerate_ids(&test_db).unwrap();
        let options = EnumeratorOptions::with_flags(EnumFlags::DEFAULT | EnumFlags::DESCENDING);
        let e = DocEnumerator::new(&test_db, &DocRange::all(), options, None).unwrap();
        let descending: Vec<String> = e.iter().map(|d| d.unwrap().doc_id).collect();
        ascending.reverse();
        prop_assert_eq!(descending, ascending);
    }
}

#[test]
fn commit_then_enumerate_yields_exactly_the_document() {
    with_temp_db(|db| {
        db.begin_transaction().unwrap();
        db.put("doc1", &first_revision(), &b"{}"[..]).unwrap();
        db.end_transaction(true).unwrap();
        assert_eq!(enumerate_ids(db).unwrap(), ["doc1"]);
    });
}

#[test]
fn abort_then_enumerate_omits_the_document() {
    with_temp_db(|db| {
        db.begin_transaction().unwrap();
        db.put("doc2", &first_revision(), &b"{}"[..]).unwrap();
        db.end_transaction(false).unwrap();
        assert!(enumerate_ids(db).unwrap().is_empty());
    });
}

#[test]
fn writers_on_one_handle_take_turns() {
    let test_db = TestDatabase::file();
    let db: Arc<Retained<Database>> = Arc::new(test_db.retain());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for round in 0..10 {
                    db.begin_transaction().unwrap();
                    db.put(&format!("w{worker}-{round}"), &first_revision(), &b"{}"[..])
                        .unwrap();
                    assert_eq!(db.transaction_level(), 1);
                    db.end_transaction(true).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(test_db.document_count().unwrap(), 40);
    assert_eq!(test_db.last_sequence().unwrap().as_u64(), 40);
}
