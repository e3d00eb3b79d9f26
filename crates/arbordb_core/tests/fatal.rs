//! Invariant violations abort the process. Each test re-runs itself in a
//! child process that performs the violation.

use arbordb_core::{Database, RefCount};
use std::process::{Command, ExitStatus};

const CASE_VAR: &str = "ARBORDB_FATAL_CASE";

fn child_case() -> Option<String> {
    std::env::var(CASE_VAR).ok()
}

fn run_child(test: &str) -> ExitStatus {
    Command::new(std::env::current_exe().unwrap())
        .args([test, "--exact", "--test-threads=1", "--nocapture"])
        .env(CASE_VAR, test)
        .status()
        .unwrap()
}

fn assert_aborted(status: ExitStatus) {
    assert!(!status.success(), "child exited cleanly: {status:?}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(6), "expected SIGABRT: {status:?}");
    }
}

#[test]
fn destroying_handle_mid_transaction_aborts() {
    if child_case().as_deref() == Some("destroying_handle_mid_transaction_aborts") {
        let db = Database::open_in_memory().unwrap();
        db.begin_transaction().unwrap();
        drop(db);
        std::process::exit(0);
    }
    assert_aborted(run_child("destroying_handle_mid_transaction_aborts"));
}

#[test]
fn dropping_counted_object_with_references_aborts() {
    if child_case().as_deref() == Some("dropping_counted_object_with_references_aborts") {
        let count = RefCount::new();
        count.retain();
        drop(count);
        std::process::exit(0);
    }
    assert_aborted(run_child("dropping_counted_object_with_references_aborts"));
}

#[test]
fn idle_handle_drops_quietly() {
    let db = Database::open_in_memory().unwrap();
    db.begin_transaction().unwrap();
    db.end_transaction(true).unwrap();
    drop(db);
}
