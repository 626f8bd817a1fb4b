/// Data structures and configuration types for the sqlean binding
///
/// This module defines the plain data types shared across the crate: the
/// database location, isolation and type-detection settings, the
/// `OpenOptions` builder, column metadata and cache statistics.
use crate::adaptation::Registry;
use crate::constants::{DEFAULT_BUSY_TIMEOUT, DEFAULT_CACHED_STATEMENTS, MEMORY_LOCATION};
use crate::error::Error;
use crate::extensions::ExtensionSelection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Private in-memory database, discarded on close
    Memory,
    /// Database file on disk (created if missing unless opened read-only)
    Path(PathBuf),
}

impl Location {
    /// Path string handed to the engine
    pub(crate) fn engine_path(&self) -> &Path {
        match self {
            Self::Memory => Path::new(MEMORY_LOCATION),
            Self::Path(path) => path,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str(MEMORY_LOCATION),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        if s == MEMORY_LOCATION {
            Self::Memory
        } else {
            Self::Path(PathBuf::from(s))
        }
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&Path> for Location {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for Location {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

/// Transaction handling chosen at open time
///
/// Determines whether data-modifying statements open an implicit transaction,
/// and which `BEGIN` flavor is used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Every statement commits on its own; no implicit transaction
    Autocommit,
    /// `BEGIN DEFERRED`: locks are acquired when first needed
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE`: write lock acquired at begin
    Immediate,
    /// `BEGIN EXCLUSIVE`: exclusive lock acquired at begin
    Exclusive,
}

impl IsolationLevel {
    /// Statement used to open the implicit transaction, if any
    pub(crate) fn begin_sql(self) -> Option<&'static str> {
        match self {
            Self::Autocommit => None,
            Self::Deferred => Some("BEGIN DEFERRED"),
            Self::Immediate => Some("BEGIN IMMEDIATE"),
            Self::Exclusive => Some("BEGIN EXCLUSIVE"),
        }
    }
}

/// Which column metadata selects a converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectTypes {
    /// Use the declared column type (`CREATE TABLE t(d DATE)`)
    pub decltypes: bool,
    /// Use a `[type]` suffix in the column name (`SELECT d AS "d [date]"`)
    pub colnames: bool,
}

impl Default for DetectTypes {
    fn default() -> Self {
        Self {
            decltypes: true,
            colnames: false,
        }
    }
}

impl DetectTypes {
    /// No conversion: rows carry native values only
    pub const NONE: Self = Self {
        decltypes: false,
        colnames: false,
    };
}

/// Failure policy for `Cursor::execute_many`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManyPolicy {
    /// Stop at the first failing parameter set
    #[default]
    StopOnError,
    /// Record the failure and carry on with the next parameter set
    Continue,
}

/// Result of `Cursor::execute_many`
#[derive(Debug, Default)]
pub struct ManyOutcome {
    /// Parameter sets that executed successfully
    pub executed: usize,
    /// Zero-based index and error of each failed set (only under `ManyPolicy::Continue`)
    pub failures: Vec<(usize, Error)>,
}

/// Name and declared type of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    /// Column name as reported by the engine (type suffix removed under `colnames`)
    pub name: String,
    /// Declared type from the schema; `None` for expressions
    pub decl_type: Option<String>,
}

/// Statement cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Maximum number of cached statements
    pub capacity: usize,
    /// Statements currently cached
    pub len: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Statements compiled by the engine, cached or not
    pub compiles: u64,
    /// Statements dropped to make room
    pub evictions: u64,
}

/// Options for `Connection::open`
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) isolation: IsolationLevel,
    pub(crate) cached_statements: usize,
    pub(crate) extensions: Option<ExtensionSelection>,
    pub(crate) extension_library: Option<PathBuf>,
    pub(crate) busy_timeout: Duration,
    pub(crate) read_only: bool,
    pub(crate) encryption_key: Option<String>,
    pub(crate) detect_types: DetectTypes,
    pub(crate) many_policy: ManyPolicy,
    pub(crate) registry: Option<Registry>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            cached_statements: DEFAULT_CACHED_STATEMENTS,
            extensions: None,
            extension_library: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            read_only: false,
            encryption_key: None,
            detect_types: DetectTypes::default(),
            many_policy: ManyPolicy::default(),
            registry: None,
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("isolation", &self.isolation)
            .field("cached_statements", &self.cached_statements)
            .field("extensions", &self.extensions)
            .field("extension_library", &self.extension_library)
            .field("busy_timeout", &self.busy_timeout)
            .field("read_only", &self.read_only)
            .field("encrypted", &self.encryption_key.is_some())
            .field("detect_types", &self.detect_types)
            .field("many_policy", &self.many_policy)
            .field("private_registry", &self.registry.is_some())
            .finish()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction handling; fixed for the connection's lifetime.
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Statement cache capacity; must be at least 1.
    pub fn cached_statements(mut self, capacity: usize) -> Self {
        self.cached_statements = capacity;
        self
    }

    /// Override the extension boundary snapshot taken from the environment.
    pub fn extensions(mut self, selection: ExtensionSelection) -> Self {
        self.extensions = Some(selection);
        self
    }

    /// Path of the loadable extension bundle.
    pub fn extension_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension_library = Some(path.into());
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Encrypt the database at rest (AES-256-CBC).
    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn detect_types(mut self, detect: DetectTypes) -> Self {
        self.detect_types = detect;
        self
    }

    pub fn many_policy(mut self, policy: ManyPolicy) -> Self {
        self.many_policy = policy;
        self
    }

    /// Use a private adaptation registry instead of the process-wide one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }
}
