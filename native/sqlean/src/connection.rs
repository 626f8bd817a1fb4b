/// Connection lifecycle management for sqlean databases
///
/// This module handles opening the engine, the per-connection state arena
/// (statement cache, cursor slots, blob slots, transaction state) and the
/// close cascade that tears all of it down in order.
///
/// A `Connection` is a cheap, cloneable handle. Every call that touches the
/// engine takes the connection's state mutex, so one connection is never
/// used by two threads at once; separate connections run concurrently.
use crate::adaptation::{self, Registry};
use crate::blob::BlobSlot;
use crate::cache::StatementCache;
use crate::constants::TOKIO_RUNTIME;
use crate::cursor::{Cursor, CursorSlot};
use crate::error::{Error, Result};
use crate::extensions::{self, ExtensionSelection};
use crate::models::{
    CacheStats, DetectTypes, IsolationLevel, Location, ManyOutcome, ManyPolicy, OpenOptions,
};
use crate::transaction::{self, TransactionState};
use crate::utils::safe_lock;
use crate::value::Params;
use bytes::Bytes;
use libsql::{Builder, Cipher, EncryptionConfig, OpenFlags};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a connection owns that the engine mutex protects.
pub(crate) struct ConnectionState {
    db: Option<libsql::Database>,
    conn: Option<libsql::Connection>,
    pub(crate) cache: StatementCache,
    pub(crate) cursors: HashMap<Uuid, CursorSlot>,
    pub(crate) blobs: HashMap<Uuid, BlobSlot>,
    pub(crate) transaction: TransactionState,
}

impl ConnectionState {
    /// The engine handle; cheap to clone.
    pub(crate) fn engine(&self) -> Result<libsql::Connection> {
        self.conn.clone().ok_or(Error::UseAfterClose("connection"))
    }

    /// Commit, refusing while blobs are open.
    pub(crate) fn commit(&mut self) -> Result<()> {
        if !self.blobs.is_empty() {
            return Err(Error::Sequencing(format!(
                "cannot commit with {} open blob handle(s); close them first",
                self.blobs.len()
            )));
        }
        let engine = self.engine()?;
        transaction::commit(&engine, &mut self.transaction)
    }

    /// Roll back, dropping every cursor's pending rows and every open blob.
    pub(crate) fn rollback(&mut self) -> Result<()> {
        let engine = self.engine()?;
        for slot in self.cursors.values_mut() {
            slot.release_execution();
        }
        self.blobs.clear();
        transaction::rollback(&engine, &mut self.transaction)
    }

    /// Re-read the transaction state from the engine after a successful statement.
    pub(crate) fn sync_transaction(&mut self, engine: &libsql::Connection) {
        self.transaction = self.transaction.after_success(engine.is_autocommit());
    }

    /// Record a statement that failed while executing.
    pub(crate) fn fail_transaction(&mut self) {
        let next = self.transaction.after_failure();
        if next != self.transaction {
            debug!("statement failed inside transaction, transaction marked failed");
        }
        self.transaction = next;
    }

    /// Tear down in order: pending rows, transaction, blobs, statements, engine.
    fn shutdown(&mut self) -> Result<()> {
        for slot in self.cursors.values_mut() {
            slot.release_execution();
        }
        let rolled_back = match self.conn.as_ref() {
            Some(engine) if !engine.is_autocommit() => {
                transaction::rollback(engine, &mut self.transaction)
            }
            _ => Ok(()),
        };
        self.cursors.clear();
        self.blobs.clear();
        self.cache.clear();
        self.transaction = TransactionState::Idle;
        self.conn = None;
        self.db = None;
        rolled_back
    }
}

/// State shared by a connection and every cursor and blob created from it.
pub(crate) struct Shared {
    id: Uuid,
    location: Location,
    pub(crate) isolation: IsolationLevel,
    pub(crate) detect_types: DetectTypes,
    pub(crate) many_policy: ManyPolicy,
    extensions: ExtensionSelection,
    pub(crate) registry: Registry,
    interrupt_handle: Mutex<Option<libsql::Connection>>,
    closed: AtomicBool,
    state: Mutex<ConnectionState>,
}

impl Shared {
    /// Lock the connection state, failing once the connection is closed.
    pub(crate) fn lock(&self, context: &str) -> Result<MutexGuard<'_, ConnectionState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UseAfterClose("connection"));
        }
        safe_lock(&self.state, context)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = safe_lock(&self.state, "Connection::close")?.shutdown();
        if let Ok(mut handle) = self.interrupt_handle.lock() {
            *handle = None;
        }
        debug!(id = %self.id, location = %self.location, "closed connection");

        result.map_err(|e| Error::Connection(format!("rollback during close failed: {e}")))
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(id = %self.id, error = %e, "failed to close connection cleanly on drop");
        }
    }
}

/// An open database connection.
#[derive(Clone)]
pub struct Connection {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("location", &self.shared.location)
            .field("isolation", &self.shared.isolation)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl Connection {
    /// Open a database file (created if missing) or a private in-memory database.
    ///
    /// The extension selection is snapshotted here and fixed for the
    /// connection's lifetime.
    pub fn open(location: impl Into<Location>, options: OpenOptions) -> Result<Self> {
        let location = location.into();
        let cache = StatementCache::new(options.cached_statements)?;
        let selection = options
            .extensions
            .clone()
            .unwrap_or_else(ExtensionSelection::from_env);
        let registry = options.registry.clone().unwrap_or_else(adaptation::global);

        let (db, conn) = TOKIO_RUNTIME.block_on(async {
            let mut builder = Builder::new_local(location.engine_path());

            if options.read_only {
                builder = builder.flags(OpenFlags::SQLITE_OPEN_READ_ONLY);
            }

            if let Some(key) = options.encryption_key.clone() {
                let config = EncryptionConfig {
                    cipher: Cipher::Aes256Cbc,
                    encryption_key: Bytes::from(key),
                };
                builder = builder.encryption_config(config);
            }

            let db = builder
                .build()
                .await
                .map_err(|e| Error::Connection(format!("failed to open {location}: {e}")))?;
            let conn = db
                .connect()
                .map_err(|e| Error::Connection(format!("failed to connect to {location}: {e}")))?;
            Ok::<_, Error>((db, conn))
        })?;

        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| Error::Connection(format!("setting busy timeout failed: {e}")))?;

        extensions::load(&conn, &selection, options.extension_library.as_deref())?;

        let id = Uuid::new_v4();
        debug!(%id, %location, isolation = ?options.isolation, "opened connection");

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                location,
                isolation: options.isolation,
                detect_types: options.detect_types,
                many_policy: options.many_policy,
                extensions: selection,
                registry,
                interrupt_handle: Mutex::new(Some(conn.clone())),
                closed: AtomicBool::new(false),
                state: Mutex::new(ConnectionState {
                    db: Some(db),
                    conn: Some(conn),
                    cache,
                    cursors: HashMap::new(),
                    blobs: HashMap::new(),
                    transaction: TransactionState::Idle,
                }),
            }),
        })
    }

    /// Open a private in-memory database with default options.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Location::Memory, OpenOptions::default())
    }

    /// Create a cursor bound to this connection.
    pub fn cursor(&self) -> Result<Cursor> {
        Cursor::new(Arc::clone(&self.shared))
    }

    /// Run one statement on a fresh cursor and return it, positioned before the first row.
    pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<Cursor> {
        let mut cursor = self.cursor()?;
        cursor.execute(sql, params)?;
        Ok(cursor)
    }

    /// Run one data-modifying statement once per parameter set on a fresh cursor.
    pub fn execute_many<I, P>(&self, sql: &str, param_sets: I) -> Result<ManyOutcome>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.cursor()?.execute_many(sql, param_sets)
    }

    /// Run a parameterless multi-statement script on a fresh cursor.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.cursor()?.execute_script(sql).map(|_| ())
    }

    /// Commit the open transaction; a no-op when idle.
    pub fn commit(&self) -> Result<()> {
        self.shared.lock("Connection::commit")?.commit()
    }

    /// Roll back the open transaction; a no-op when idle.
    ///
    /// Pending rows of every cursor on this connection are discarded and open
    /// blob handles are invalidated.
    pub fn rollback(&self) -> Result<()> {
        self.shared.lock("Connection::rollback")?.rollback()
    }

    /// Close the connection and everything created from it.
    ///
    /// An open transaction is rolled back first. Closing an already closed
    /// connection does nothing. Clones of this handle are closed too.
    pub fn close(&self) -> Result<()> {
        self.shared.close()
    }

    /// Ask the engine to abort the statement currently running on this connection.
    ///
    /// Does not wait for the connection mutex, so it can be called from
    /// another thread while a statement is running.
    pub fn interrupt(&self) -> Result<()> {
        let handle = safe_lock(&self.shared.interrupt_handle, "Connection::interrupt")?;
        let engine = handle.as_ref().ok_or(Error::UseAfterClose("connection"))?;
        engine
            .interrupt()
            .map_err(|e| Error::Connection(format!("interrupt failed: {e}")))
    }

    pub fn transaction_state(&self) -> Result<TransactionState> {
        Ok(self.shared.lock("Connection::transaction_state")?.transaction)
    }

    /// Whether the engine currently has an open transaction.
    pub fn in_transaction(&self) -> Result<bool> {
        let state = self.shared.lock("Connection::in_transaction")?;
        Ok(!state.engine()?.is_autocommit())
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.shared.isolation
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Rows changed by the most recent data-modifying statement.
    pub fn changes(&self) -> Result<u64> {
        let state = self.shared.lock("Connection::changes")?;
        Ok(state.engine()?.changes())
    }

    /// Rows changed since the connection was opened.
    pub fn total_changes(&self) -> Result<u64> {
        let state = self.shared.lock("Connection::total_changes")?;
        Ok(state.engine()?.total_changes())
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        let state = self.shared.lock("Connection::last_insert_rowid")?;
        Ok(state.engine()?.last_insert_rowid())
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.shared.lock("Connection::cache_stats")?.cache.stats())
    }

    /// Whether a compiled statement for `sql` is currently cached.
    pub fn is_cached(&self, sql: &str) -> Result<bool> {
        Ok(self.shared.lock("Connection::is_cached")?.cache.contains(sql))
    }

    /// Drop the cached statement for `sql`, forcing a recompile on next use.
    pub fn invalidate_statement(&self, sql: &str) -> Result<bool> {
        Ok(self
            .shared
            .lock("Connection::invalidate_statement")?
            .cache
            .invalidate(sql))
    }

    /// Extension groups this connection was opened with.
    pub fn extensions(&self) -> &ExtensionSelection {
        &self.shared.extensions
    }

    /// Adaptation registry used by this connection.
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn location(&self) -> &Location {
        &self.shared.location
    }
}
