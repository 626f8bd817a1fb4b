/// Per-connection statement cache.
///
/// Compiled statements are kept in an LRU table keyed by SQL text. Looking a
/// statement up checks it out as a `Lease`; a statement already checked out by
/// another execution is never handed out twice, a fresh uncached copy is
/// compiled instead.
use crate::error::{Error, Result};
use crate::models::CacheStats;
use crate::statement::{Lease, Statement};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct StatementCache {
    entries: LruCache<String, Arc<Statement>>,
    hits: u64,
    compiles: u64,
    evictions: u64,
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl StatementCache {
    /// Create a cache holding at most `capacity` statements.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::Connection("statement cache capacity must be at least 1".to_string())
        })?;
        Ok(Self {
            entries: LruCache::new(capacity),
            hits: 0,
            compiles: 0,
            evictions: 0,
        })
    }

    /// Check out the statement for `sql`, compiling it on a miss.
    ///
    /// A hit returns the cached statement reset and marked most recently used.
    /// A miss compiles, inserts and may evict the least recently used entry.
    /// Compile errors leave the cache untouched.
    pub fn get_or_compile(&mut self, conn: &libsql::Connection, sql: &str) -> Result<Lease> {
        if let Some(stmt) = self.entries.get(sql) {
            if stmt.try_acquire() {
                let stmt = Arc::clone(stmt);
                if let Err(e) = stmt.reset() {
                    drop(Lease::new(stmt));
                    return Err(e);
                }
                self.hits += 1;
                trace!(sql, "statement cache hit");
                return Ok(Lease::new(stmt));
            }

            // Held by a live execution: run this one on a private copy.
            let stmt = Arc::new(Statement::compile(conn, sql)?);
            self.compiles += 1;
            stmt.try_acquire();
            trace!(sql, "cached statement busy, compiled an uncached copy");
            return Ok(Lease::new(stmt));
        }

        let stmt = Arc::new(Statement::compile(conn, sql)?);
        self.compiles += 1;
        stmt.try_acquire();
        if let Some((evicted, _)) = self.entries.push(sql.to_string(), Arc::clone(&stmt)) {
            self.evictions += 1;
            debug!(sql = %evicted, "evicted statement from cache");
        }
        Ok(Lease::new(stmt))
    }

    /// Drop the cached statement for `sql`; returns whether one was cached.
    ///
    /// An execution still holding it keeps running; the engine handle is
    /// finalized when that execution releases it.
    pub fn invalidate(&mut self, sql: &str) -> bool {
        self.entries.pop(sql).is_some()
    }

    /// Drop every cached statement.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether `sql` is cached, without touching recency.
    pub fn contains(&self, sql: &str) -> bool {
        self.entries.contains(sql)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.entries.cap().get(),
            len: self.entries.len(),
            hits: self.hits,
            compiles: self.compiles,
            evictions: self.evictions,
        }
    }
}
