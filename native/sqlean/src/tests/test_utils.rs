//! Fixtures shared by the test modules
//!
//! Temporary database paths, a cleanup guard for them, and connection
//! constructors that ignore the extension environment flags.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::unwrap_used)]

use crate::{Connection, ExtensionSelection, IsolationLevel, OpenOptions};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Files the engine may leave next to a database.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Deletes a temporary database and its sidecar files on drop.
///
/// Bind it before any connection in the test body: locals drop in reverse
/// order, so the connections are gone by the time the files are removed.
///
/// ```ignore
/// let db_path = setup_test_db_with_prefix("cursor");
/// let _guard = TestDbGuard::new(db_path.clone());
/// let conn = Connection::open(db_path.as_path(), test_options()).unwrap();
/// ```
pub struct TestDbGuard {
    db_path: PathBuf,
}

impl TestDbGuard {
    pub fn new(db_path: PathBuf) -> Self {
        TestDbGuard { db_path }
    }
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.db_path);
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = self.db_path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = fs::remove_file(sidecar);
        }
    }
}

/// Unique path in the temp directory, e.g. `z_sqlean_test-errors-<uuid>.db`.
pub fn setup_test_db_with_prefix(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("z_sqlean_test-{prefix}-{}.db", Uuid::new_v4()))
}

/// Options that never load the extension bundle, whatever the environment says.
pub fn test_options() -> OpenOptions {
    OpenOptions::new().extensions(ExtensionSelection::None)
}

/// In-memory connection with the default (deferred) isolation.
pub fn memory_conn() -> Connection {
    Connection::open(":memory:", test_options()).unwrap()
}

/// In-memory connection that commits every statement on its own.
pub fn autocommit_conn() -> Connection {
    Connection::open(
        ":memory:",
        test_options().isolation(IsolationLevel::Autocommit),
    )
    .unwrap()
}
