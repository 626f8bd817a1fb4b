//! Incremental access to one blob value.
//!
//! A [`Blob`] addresses a single cell by (table, column, rowid) and moves a
//! window over it: reads fetch `substr()` slices, writes splice bytes in place
//! without changing the length. Writes follow the same implicit-transaction
//! rules as any data-modifying statement, and the handle must be closed before
//! that transaction commits.

use crate::connection::{Connection, ConnectionState, Shared};
use crate::constants::SQLITE_READONLY;
use crate::error::{Error, Result};
use crate::statement::StepResult;
use crate::transaction;
use crate::utils::{quote_identifier, safe_read};
use crate::value::{Params, Value};
use bytes::Bytes;
use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Blob handle state kept in the connection.
#[derive(Debug)]
pub(crate) struct BlobSlot {
    table: String,
    column: String,
    rowid: i64,
    read_only: bool,
}

impl BlobSlot {
    fn read_sql(&self) -> String {
        format!(
            "SELECT substr({c}, ?1, ?2) FROM {t} WHERE rowid = ?3",
            c = self.column,
            t = self.table
        )
    }

    fn write_sql(&self) -> String {
        format!(
            "UPDATE {t} SET {c} = unhex(substr(hex({c}), 1, ?1) || ?2 || substr(hex({c}), ?3)) WHERE rowid = ?4",
            c = self.column,
            t = self.table
        )
    }
}

/// Run a one-row query through the statement cache and return its first row.
fn query_row(state: &mut ConnectionState, shared: &Shared, sql: &str, params: Params) -> Result<Option<Vec<Value>>> {
    let engine = state.engine()?;
    let lease = state.cache.get_or_compile(&engine, sql)?;
    let bound = {
        let registry = safe_read(&shared.registry, "Blob registry")?;
        lease.statement().bind(&params, &registry)?
    };
    let mut execution = lease.query(bound)?;
    match execution.step()? {
        StepResult::Row(values) => Ok(Some(values)),
        StepResult::Done => Ok(None),
    }
}

impl Connection {
    /// Open a handle on the blob stored at `table.column` in row `rowid`.
    ///
    /// The row must exist and hold a blob (NULL opens as an empty blob).
    pub fn blob_open(&self, table: &str, column: &str, rowid: i64, read_only: bool) -> Result<Blob> {
        let shared = &self.shared;
        let mut guard = shared.lock("Connection::blob_open")?;
        let state = &mut *guard;

        let slot = BlobSlot {
            table: quote_identifier(table),
            column: quote_identifier(column),
            rowid,
            read_only,
        };
        let sql = format!(
            "SELECT typeof({c}), length({c}) FROM {t} WHERE rowid = ?1",
            c = slot.column,
            t = slot.table
        );

        let row = query_row(state, shared, &sql, Params::Positional(vec![Value::Integer(rowid)]))?
            .ok_or_else(|| Error::sql(format!("no such rowid: {rowid}"), &sql))?;
        let len = match (row.first().and_then(Value::as_str), row.get(1)) {
            (Some("blob"), Some(Value::Integer(len))) => u64::try_from(*len).unwrap_or(0),
            (Some("null"), _) => 0,
            (kind, _) => {
                return Err(Error::sql(
                    format!("cannot open value of type {}", kind.unwrap_or("unknown")),
                    &sql,
                ))
            }
        };

        let id = Uuid::new_v4();
        state.blobs.insert(id, slot);
        Ok(Blob {
            shared: Arc::clone(shared),
            id,
            position: 0,
            len,
        })
    }
}

/// Incremental read/write handle on one blob value.
pub struct Blob {
    shared: Arc<Shared>,
    id: Uuid,
    position: u64,
    len: u64,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("len", &self.len)
            .finish()
    }
}

impl Blob {
    /// Blob length in bytes; fixed for the handle's lifetime.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current offset.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Read up to `size` bytes from the current offset and advance past them.
    ///
    /// Returns an empty buffer at the end of the blob.
    pub fn read_chunk(&mut self, size: usize) -> Result<Bytes> {
        let mut guard = self.shared.lock("Blob::read")?;
        let state = &mut *guard;
        let (sql, rowid) = {
            let slot = state.blobs.get(&self.id).ok_or(Error::UseAfterClose("blob"))?;
            (slot.read_sql(), slot.rowid)
        };

        let remaining = self.len.saturating_sub(self.position);
        let size = remaining.min(size as u64);
        if size == 0 {
            return Ok(Bytes::new());
        }

        let params = Params::Positional(vec![
            Value::from(to_sql_int(self.position + 1)),
            Value::from(to_sql_int(size)),
            Value::Integer(rowid),
        ]);
        let row = query_row(state, &self.shared, &sql, params)?
            .ok_or_else(|| Error::sql(format!("no such rowid: {rowid}"), &sql))?;

        let bytes = match row.into_iter().next() {
            Some(Value::Blob(bytes)) => bytes,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(Error::sql(
                    format!("blob value changed type to {}", other.type_name()),
                    &sql,
                ))
            }
        };
        self.position += bytes.len() as u64;
        Ok(Bytes::from(bytes))
    }

    /// Overwrite bytes at the current offset and advance past them.
    ///
    /// The blob cannot grow: writing past its end is an error.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let mut guard = shared.lock("Blob::write")?;
        let state = &mut *guard;
        let slot = state.blobs.get(&self.id).ok_or(Error::UseAfterClose("blob"))?;
        let sql = slot.write_sql();

        if slot.read_only {
            return Err(Error::Sql {
                message: "attempt to write a readonly blob".to_string(),
                code: Some(SQLITE_READONLY),
                sql,
            });
        }
        let end = self.position + data.len() as u64;
        if end > self.len {
            return Err(Error::sql(
                format!(
                    "cannot write {} bytes at offset {}: blob is {} bytes long",
                    data.len(),
                    self.position,
                    self.len
                ),
                &sql,
            ));
        }
        if data.is_empty() {
            return Ok(());
        }
        let rowid = slot.rowid;

        state.transaction.ensure_usable("write blob")?;
        let engine = state.engine()?;
        let lease = state.cache.get_or_compile(&engine, &sql)?;
        let params = Params::Positional(vec![
            Value::from(to_sql_int(self.position * 2)),
            Value::Text(hex_upper(data)),
            Value::from(to_sql_int(end * 2 + 1)),
            Value::Integer(rowid),
        ]);
        let bound = {
            let registry = safe_read(&shared.registry, "Blob::write registry")?;
            lease.statement().bind(&params, &registry)?
        };

        transaction::begin_implicit(&engine, shared.isolation, &mut state.transaction)?;
        if let Err(e) = lease.execute(bound) {
            state.fail_transaction();
            return Err(e);
        }
        drop(lease);
        state.sync_transaction(&engine);

        self.position = end;
        Ok(())
    }

    /// Move the offset; seeking past the end is allowed, before the start is not.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            Error::Sequencing(format!("cannot seek to {pos:?}: offset would be negative"))
        })?;
        self.position = target;
        Ok(target)
    }

    /// Invalidate the handle. Closing twice does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        self.shared.lock("Blob::close")?.blobs.remove(&self.id);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self.shared.lock("Blob::is_closed") {
            Ok(guard) => !guard.blobs.contains_key(&self.id),
            Err(_) => true,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::UseAfterClose("blob"));
        }
        Ok(())
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn hex_upper(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn to_io(err: Error) -> io::Error {
    io::Error::other(err)
}

impl io::Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.read_chunk(buf.len()).map_err(to_io)?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

impl io::Write for Blob {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf).map_err(to_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for Blob {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Blob::seek(self, pos).map_err(to_io)
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if self.shared.is_closed() {
            return;
        }
        match self.shared.lock("Blob::drop") {
            Ok(mut guard) => {
                guard.blobs.remove(&self.id);
            }
            Err(e) => warn!(blob = %self.id, error = %e, "failed to release blob on drop"),
        }
    }
}
