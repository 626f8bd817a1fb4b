/// Utility functions and helpers for the sqlean binding
///
/// This module provides commonly used helpers for locking, statement
/// classification, identifier quoting and declared-type parsing.
use crate::error::Error;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Safely lock a mutex with proper error handling
///
/// Returns a descriptive error message if the mutex is poisoned.
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>, Error> {
    mutex
        .lock()
        .map_err(|e| Error::Connection(format!("Mutex poisoned in {context}: {e}")))
}

/// Safely take a read lock with proper error handling
pub fn safe_read<'a, T>(
    lock: &'a RwLock<T>,
    context: &str,
) -> Result<RwLockReadGuard<'a, T>, Error> {
    lock.read()
        .map_err(|e| Error::Connection(format!("RwLock poisoned in {context}: {e}")))
}

/// Safely take a write lock with proper error handling
pub fn safe_write<'a, T>(
    lock: &'a RwLock<T>,
    context: &str,
) -> Result<RwLockWriteGuard<'a, T>, Error> {
    lock.write()
        .map_err(|e| Error::Connection(format!("RwLock poisoned in {context}: {e}")))
}

/// Query type enumeration used to drive implicit transactions
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Drop,
    Alter,
    Begin,
    Commit,
    Rollback,
    Other,
}

impl QueryType {
    /// Data-modifying statements open an implicit transaction
    pub fn is_dml(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Replace
        )
    }

    /// Statements after which `lastrowid` is refreshed
    pub fn sets_lastrowid(self) -> bool {
        matches!(self, Self::Insert | Self::Replace)
    }
}

/// Detect the query type from a SQL statement
///
/// Examines the first keyword to categorize the statement. Leading whitespace,
/// `(`, `;` and `--` or `/* */` comments are skipped first.
pub fn detect_query_type(query: &str) -> QueryType {
    let body = skip_leading_trivia(query);
    let keyword = &body[..body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len())];

    // Longest keyword is 8 bytes; skip the uppercase allocation for anything longer.
    if keyword.len() > 8 {
        return QueryType::Other;
    }

    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" => QueryType::Select,
        "INSERT" => QueryType::Insert,
        "UPDATE" => QueryType::Update,
        "DELETE" => QueryType::Delete,
        "REPLACE" => QueryType::Replace,
        "CREATE" => QueryType::Create,
        "DROP" => QueryType::Drop,
        "ALTER" => QueryType::Alter,
        "BEGIN" => QueryType::Begin,
        "COMMIT" | "END" => QueryType::Commit,
        "ROLLBACK" => QueryType::Rollback,
        _ => QueryType::Other,
    }
}

fn skip_leading_trivia(mut sql: &str) -> &str {
    loop {
        let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(' || c == ';');
        if let Some(rest) = trimmed.strip_prefix("--") {
            sql = rest.find('\n').map_or("", |end| &rest[end + 1..]);
        } else if let Some(rest) = trimmed.strip_prefix("/*") {
            // An unterminated comment swallows the rest of the text.
            sql = rest.find("*/").map_or("", |end| &rest[end + 2..]);
        } else {
            return trimmed;
        }
    }
}

/// Quote an SQLite identifier
///
/// Escapes any double quotes by doubling them, then wraps in double quotes.
pub fn quote_identifier(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\"\""))
}

/// Normalize a declared column type to a converter key
///
/// Cuts at the first `(` or whitespace and lower-cases ASCII:
/// `"VARCHAR(20)"` becomes `"varchar"`, `" Timestamp "` becomes `"timestamp"`.
pub fn normalize_decl_type(decl: &str) -> String {
    decl.trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Split a `name [type]` column alias into its name and type parts
///
/// Returns the column name unchanged and `None` when there is no bracketed type.
pub fn split_colname_type(column: &str) -> (String, Option<String>) {
    let Some(open) = column.find('[') else {
        return (column.to_string(), None);
    };
    let Some(close) = column[open..].find(']') else {
        return (column.to_string(), None);
    };

    let type_name = column[open + 1..open + close].trim();
    if type_name.is_empty() {
        return (column.to_string(), None);
    }
    (
        column[..open].trim_end().to_string(),
        Some(type_name.to_string()),
    )
}

/// Strip the `:`, `@` or `$` prefix from a parameter name
pub fn strip_parameter_prefix(name: &str) -> &str {
    name.strip_prefix([':', '@', '$']).unwrap_or(name)
}
