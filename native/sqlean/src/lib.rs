//! `sqlean`: blocking binding over an embedded `LibSQL` database
//!
//! This is the root module of the binding runtime. It declares and organizes
//! the submodules handling connections, cursors, statement caching, type
//! adaptation, blob streaming and the extension boundary.
pub mod adaptation;
pub mod blob;
pub mod cache;
pub mod connection;
pub mod constants;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod extensions;
pub mod models;
pub mod row;
pub mod statement;
pub mod transaction;
pub mod utils;
pub mod value;

// Re-export the public surface
pub use adaptation::{AdaptationRegistry, Registry};
pub use blob::Blob;
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, Result};
pub use extensions::{ExtensionGroup, ExtensionSelection};
pub use models::*;
pub use row::Row;
pub use transaction::TransactionState;
pub use utils::{detect_query_type, QueryType};
pub use value::{CustomValue, Params, Value};

#[cfg(test)]
mod tests;
