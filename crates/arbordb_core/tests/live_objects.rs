//! The process-wide live object count. Kept alone in its own test binary so
//! no concurrent test moves the count.

use arbordb_core::{
    live_object_count, Database, DocEnumerator, DocRange, EnumeratorOptions, InstanceCounted,
};

#[test]
fn count_returns_to_baseline() {
    let baseline = live_object_count();

    for _ in 0..25 {
        let db = Database::open_in_memory().unwrap();
        let e = DocEnumerator::new(&db, &DocRange::all(), EnumeratorOptions::default(), None)
            .unwrap();
        assert_eq!(live_object_count(), baseline + 2);
        let extra = db.retain();
        drop(db);
        drop(e);
        assert_eq!(live_object_count(), baseline + 1);
        drop(extra);
        assert_eq!(live_object_count(), baseline);
    }

    let keys: Vec<InstanceCounted> = (0..10).map(|_| InstanceCounted::new()).collect();
    assert_eq!(live_object_count(), baseline + 10);
    drop(keys);
    assert_eq!(live_object_count(), baseline);
}
