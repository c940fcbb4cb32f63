//! Fuzz target: fault-log export decoding
//!
//! Feeds arbitrary bytes to `FaultLog::decode` (the path a supervisor
//! takes when reading an exported blob) and checks that whatever decodes
//! re-encodes without error and never exceeds the log depth.
//!
//! cargo fuzz run fuzz_fault_log

#![no_main]

use libfuzzer_sys::fuzz_target;
use powerpath::diagnostics::{FAULT_LOG_DEPTH, FaultLog};

fuzz_target!(|data: &[u8]| {
    let Ok(records) = FaultLog::decode(data) else {
        return;
    };
    assert!(records.len() <= FAULT_LOG_DEPTH);

    let mut log = FaultLog::new();
    for record in &records {
        log.record(*record);
    }
    assert_eq!(log.len(), records.len());

    let mut buf = [0u8; 1024];
    let blob = log.encode(&mut buf).expect("re-encode of decoded records");
    let again = FaultLog::decode(blob).expect("round trip");
    assert_eq!(again.as_slice(), records.as_slice());
});
