#![no_main]
//! Fuzz test for detect_query_type
//!
//! The cursor classifies every statement it runs to decide whether an implicit
//! transaction is needed. It must handle all inputs without panicking.

use libfuzzer_sys::fuzz_target;
use sqlean::detect_query_type;

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let query_type = detect_query_type(sql);
        // Only data-modifying statements may refresh lastrowid.
        if query_type.sets_lastrowid() {
            assert!(query_type.is_dml());
        }
    }
});
