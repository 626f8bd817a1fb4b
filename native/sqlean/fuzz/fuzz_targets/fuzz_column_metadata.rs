#![no_main]
//! Fuzz test for column and parameter name handling
//!
//! Declared types, `name [type]` aliases and parameter names come straight from
//! user SQL, so the helpers that pick converters and match named parameters
//! must accept anything.

use libfuzzer_sys::fuzz_target;
use sqlean::utils::{normalize_decl_type, split_colname_type, strip_parameter_prefix};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let key = normalize_decl_type(text);
        assert_eq!(normalize_decl_type(&key), key);

        let (name, type_name) = split_colname_type(text);
        if let Some(type_name) = type_name {
            assert!(!type_name.is_empty());
            assert!(name.len() < text.len());
        } else {
            assert_eq!(name, text);
        }

        let stripped = strip_parameter_prefix(text);
        assert!(text.ends_with(stripped));
    }
});
