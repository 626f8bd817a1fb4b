#![no_main]
//! Fuzz test for the default date and timestamp converters
//!
//! Converters run on raw column bytes, which may be anything a table holds.
//! Whatever they accept must survive a trip back through the matching adapter.

use libfuzzer_sys::fuzz_target;
use sqlean::adaptation::{adapt_date, adapt_timestamp, convert_date, convert_timestamp};

fuzz_target!(|data: &[u8]| {
    if let Ok(date) = convert_date(data) {
        let text = adapt_date(&date);
        assert_eq!(convert_date(text.as_bytes()).ok(), Some(date));
    }
    if let Ok(ts) = convert_timestamp(data) {
        let text = adapt_timestamp(&ts);
        assert_eq!(convert_timestamp(text.as_bytes()).ok(), Some(ts));
    }
});
