//! Warnings emitted at the C boundary.

use arbordb_ffi::*;
use std::io::{self, Write};
use std::ptr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn privileged_flags_are_logged_and_ignored() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || unsafe {
        let db = arb_db_open_memory(ptr::null_mut());
        let options = ArbEnumeratorOptions {
            flags: arb_enum_options_default().flags | 0x8000,
            ..arb_enum_options_default()
        };
        let mut err = ArbError::none();
        let e = arb_db_enumerate_all(
            db,
            ptr::null(),
            ptr::null(),
            &options,
            ptr::null(),
            &mut err,
        );
        assert!(!e.is_null(), "{err:?}");

        let mut doc = ArbDocument::empty();
        assert_eq!(arb_enum_next(e, &mut doc, &mut err), ArbEnumResult::End);
        arb_enum_release(e);
        arb_db_release(db);
    });

    let log = captured.text();
    assert!(log.contains("WARN"), "{log}");
    assert!(log.contains("privileged enumeration flags"), "{log}");
}
