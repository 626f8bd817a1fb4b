#![no_main]
//! Keyword-led SQL fuzzing
//!
//! Builds statements from a table of leading keywords plus arbitrary padding
//! and body text, and checks that the DML and commit keywords classify no
//! matter what follows them.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sqlean::{detect_query_type, QueryType};

const KEYWORDS: &[(&str, Option<QueryType>)] = &[
    ("SELECT", Some(QueryType::Select)),
    ("INSERT", Some(QueryType::Insert)),
    ("UPDATE", Some(QueryType::Update)),
    ("DELETE", Some(QueryType::Delete)),
    ("REPLACE", Some(QueryType::Replace)),
    ("CREATE", Some(QueryType::Create)),
    ("DROP", Some(QueryType::Drop)),
    ("ALTER", Some(QueryType::Alter)),
    ("BEGIN", Some(QueryType::Begin)),
    ("COMMIT", Some(QueryType::Commit)),
    ("END", Some(QueryType::Commit)),
    ("ROLLBACK", Some(QueryType::Rollback)),
    ("PRAGMA", None),
    ("WITH", None),
    ("EXPLAIN", None),
];

#[derive(Debug, Arbitrary)]
struct Statement<'a> {
    padding: &'a str,
    keyword: u8,
    /// Used instead of a table keyword when set
    raw_keyword: Option<[u8; 6]>,
    lowercase: bool,
    body: &'a str,
    returning: bool,
}

fuzz_target!(|stmt: Statement| {
    let (keyword, expected) = match stmt.raw_keyword {
        Some(bytes) => (bytes.iter().copied().map(char::from).collect(), None),
        None => {
            let (word, kind) = KEYWORDS[usize::from(stmt.keyword) % KEYWORDS.len()];
            (word.to_string(), kind)
        }
    };

    let mut sql = String::from(stmt.padding);
    if stmt.lowercase {
        sql.push_str(&keyword.to_lowercase());
    } else {
        sql.push_str(&keyword);
    }
    sql.push(' ');
    sql.push_str(stmt.body);
    if stmt.returning {
        sql.push_str(" RETURNING *");
    }

    let kind = detect_query_type(&sql);
    if kind.sets_lastrowid() {
        assert!(kind.is_dml());
    }

    if stmt.padding.chars().all(char::is_whitespace) {
        if let Some(expected) = expected {
            assert_eq!(kind, expected, "{sql:?}");
        }
    }
});
