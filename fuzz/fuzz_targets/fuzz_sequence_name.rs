#![no_main]

use std::sync::Arc;

use docseq::contracts::{SequenceError, SequenceGenerator};
use docseq::storage::{derive_prefix, MemorySequenceStore, StoreSequenceGenerator};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary names, including invalid UTF-8 turned into replacement chars
    let name = String::from_utf8_lossy(data);

    let _ = derive_prefix(&name);

    let gen = StoreSequenceGenerator::with_defaults(Arc::new(MemorySequenceStore::new()));
    match gen.next(&name) {
        Ok(first) => {
            let second = gen.next(&name).expect("second call on a valid name");
            assert_ne!(first, second);
        }
        Err(SequenceError::InvalidArgument(_)) => assert!(name.trim().is_empty()),
        Err(e) => panic!("unexpected error for {name:?}: {e}"),
    }
});
