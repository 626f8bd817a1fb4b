/// Global constants and the shared async runtime for the sqlean binding
///
/// This module holds all static configuration used throughout the codebase:
/// defaults for `OpenOptions`, the extension boundary's environment signal
/// names, and the Tokio runtime every engine future is driven on.
use once_cell::sync::Lazy;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Global Tokio runtime for engine operations
///
/// libsql exposes an async API; the binding is blocking, so every engine call
/// is wrapped in `TOKIO_RUNTIME.block_on(..)`.
///
/// IMPORTANT: This panics if Tokio runtime creation fails, which can only happen in
/// extremely rare circumstances (e.g., system has no available threads). In normal
/// operation, runtime creation succeeds immediately on the first engine call.
///
/// If you see "Failed to initialize Tokio runtime" panics, check:
/// - System has available threads
/// - Ulimit settings (-u) are not too restrictive
/// - System memory is available
#[allow(clippy::expect_used)]
pub static TOKIO_RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Runtime::new()
        .expect("Failed to initialize Tokio runtime - check system resources and thread limits")
});

/// Location marker for an in-memory database
pub const MEMORY_LOCATION: &str = ":memory:";

/// Default capacity of the per-connection statement cache
pub const DEFAULT_CACHED_STATEMENTS: usize = 64;

/// Default time the engine waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default batch size for `Cursor::fetch_many_default`
pub const DEFAULT_ARRAYSIZE: usize = 1;

/// Environment flag enabling (`1`) or disabling (`0`) every extension group
pub const ENV_ENABLE_ALL: &str = "SQLEAN_ENABLE";

/// Prefix of the per-group flags, e.g. `SQLEAN_ENABLE_REGEXP`
pub const ENV_ENABLE_PREFIX: &str = "SQLEAN_ENABLE_";

/// Environment variable naming the loadable extension bundle
pub const ENV_LIBRARY: &str = "SQLEAN_LIBRARY";

/// Entry point exported by the extension bundle
pub const EXTENSION_ENTRY_POINT: &str = "sqlite3_sqlean_init";

/// SQLite primary result code for an interrupted operation
pub const SQLITE_INTERRUPT: i32 = 9;

/// SQLite primary result code for a write to a read-only resource
pub const SQLITE_READONLY: i32 = 8;
