/// Compiled statements for sqlean connections.
///
/// This module handles one compiled engine statement, including:
/// - Compiling SQL text and capturing parameter names and column metadata
/// - Binding positional or named parameters through the adaptation registry
/// - Checking a statement out for one execution (`Lease`) and returning it
/// - Stepping a running execution one row at a time (`Execution`)
///
/// A statement is stepped by at most one execution at a time. The `in_use`
/// flag is claimed by `try_acquire` and cleared when the lease drops, after
/// the engine handle has been reset.
///
/// **Note on Locking**: engine futures borrow the statement through its mutex
/// guard, so the guard is held across `.await` inside `TOKIO_RUNTIME.block_on()`.
use crate::adaptation::AdaptationRegistry;
use crate::constants::TOKIO_RUNTIME;
use crate::decode;
use crate::error::{Error, Result};
use crate::models::ColumnDescription;
use crate::utils::{safe_lock, strip_parameter_prefix};
use crate::value::{Params, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// One compiled statement and its metadata.
pub struct Statement {
    sql: String,
    raw: Mutex<libsql::Statement>,
    parameter_names: Vec<Option<String>>,
    columns: Vec<ColumnDescription>,
    in_use: AtomicBool,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("parameters", &self.parameter_names)
            .field("columns", &self.columns)
            .field("in_use", &self.in_use.load(Ordering::Acquire))
            .finish()
    }
}

impl Statement {
    /// Compile `sql` on the engine connection.
    ///
    /// Compile errors carry the engine's diagnostic text verbatim.
    pub(crate) fn compile(conn: &libsql::Connection, sql: &str) -> Result<Self> {
        let raw = TOKIO_RUNTIME
            .block_on(conn.prepare(sql))
            .map_err(|e| Error::from_engine(e, sql))?;

        let parameter_names = (1..=raw.parameter_count())
            .map(|i| {
                i32::try_from(i)
                    .ok()
                    .and_then(|i| raw.parameter_name(i))
                    .filter(|name| !name.starts_with('?'))
                    .map(str::to_string)
            })
            .collect();

        let columns = raw
            .columns()
            .iter()
            .map(|c| ColumnDescription {
                name: c.name().to_string(),
                decl_type: c.decl_type().map(str::to_string),
            })
            .collect();

        trace!(sql, "compiled statement");

        Ok(Self {
            sql: sql.to_string(),
            raw: Mutex::new(raw),
            parameter_names,
            columns,
            in_use: AtomicBool::new(false),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of parameter slots (the highest parameter index).
    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }

    /// Name of each slot as written (`:name`); `None` for anonymous `?` slots.
    pub fn parameter_names(&self) -> &[Option<String>] {
        &self.parameter_names
    }

    /// Result columns; empty for statements that return no rows.
    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    /// Whether an execution currently holds this statement.
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Adapt and order `params` for this statement's slots.
    ///
    /// Nothing reaches the engine here: a bind failure has no side effects.
    pub fn bind(&self, params: &Params, registry: &AdaptationRegistry) -> Result<Vec<libsql::Value>> {
        let count = self.parameter_count();
        let values: &[Value] = match params {
            Params::None => &[],
            Params::Positional(values) => values,
            Params::Named(pairs) => return self.bind_named(pairs, registry),
        };
        if values.len() != count {
            return Err(Error::bind(format!(
                "Incorrect number of bindings supplied. The current statement uses {count}, and there are {} supplied.",
                values.len()
            )));
        }
        values
            .iter()
            .enumerate()
            .map(|(i, value)| adapt_one(registry, value, i + 1))
            .collect()
    }

    fn bind_named(
        &self,
        pairs: &[(String, Value)],
        registry: &AdaptationRegistry,
    ) -> Result<Vec<libsql::Value>> {
        let supplied: HashMap<&str, &Value> = pairs
            .iter()
            .map(|(key, value)| (strip_parameter_prefix(key), value))
            .collect();

        // Every supplied name must match a slot, checked before any adaptation.
        if let Some(unknown) = supplied.keys().find(|key| {
            !self
                .parameter_names
                .iter()
                .flatten()
                .any(|name| strip_parameter_prefix(name) == **key)
        }) {
            return Err(Error::Bind {
                message: format!("Unknown named parameter :{unknown}."),
                index: None,
                name: Some((*unknown).to_string()),
            });
        }

        let mut bound = Vec::with_capacity(self.parameter_count());
        for (i, slot) in self.parameter_names.iter().enumerate() {
            let position = i + 1;
            let Some(name) = slot else {
                return Err(Error::bind(format!(
                    "Binding {position} has no name, but named parameters were supplied."
                ))
                .at_parameter(position));
            };
            let key = strip_parameter_prefix(name);
            let Some(value) = supplied.get(key) else {
                return Err(Error::Bind {
                    message: format!("You did not supply a value for binding parameter {name}."),
                    index: Some(position),
                    name: Some(key.to_string()),
                });
            };
            bound.push(adapt_one(registry, value, position)?);
        }
        Ok(bound)
    }

    /// Rewind the engine handle so it can run again with new bindings.
    pub fn reset(&self) -> Result<()> {
        safe_lock(&self.raw, "Statement::reset")?.reset();
        Ok(())
    }

    /// Claim the statement for one execution; `false` if already claimed.
    pub(crate) fn try_acquire(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        if let Ok(raw) = self.raw.lock() {
            raw.reset();
        }
        self.in_use.store(false, Ordering::Release);
    }
}

fn adapt_one(registry: &AdaptationRegistry, value: &Value, position: usize) -> Result<libsql::Value> {
    registry
        .adapt(value)
        .and_then(decode::to_engine_value)
        .map_err(|e| e.at_parameter(position))
}

/// A statement checked out for one execution; released on drop.
pub struct Lease {
    stmt: Arc<Statement>,
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.stmt.sql).finish()
    }
}

impl Lease {
    /// Wrap a statement already claimed with `try_acquire`.
    pub(crate) fn new(stmt: Arc<Statement>) -> Self {
        Self { stmt }
    }

    pub fn statement(&self) -> &Statement {
        &self.stmt
    }

    /// Run a statement that returns no rows to completion.
    #[allow(clippy::await_holding_lock)]
    pub(crate) fn execute(&self, bound: Vec<libsql::Value>) -> Result<u64> {
        let stmt = &self.stmt;
        TOKIO_RUNTIME.block_on(async {
            let raw = safe_lock(&stmt.raw, "Lease::execute")?;
            raw.reset();
            raw.execute(bound)
                .await
                .map(|changes| changes as u64)
                .map_err(|e| Error::from_engine(e, &stmt.sql))
        })
    }

    /// Start a row-returning execution; the lease travels with it.
    #[allow(clippy::await_holding_lock)]
    pub(crate) fn query(self, bound: Vec<libsql::Value>) -> Result<Execution> {
        let rows = TOKIO_RUNTIME.block_on(async {
            let raw = safe_lock(&self.stmt.raw, "Lease::query")?;
            raw.reset();
            raw.query(bound)
                .await
                .map_err(|e| Error::from_engine(e, &self.stmt.sql))
        })?;

        Ok(Execution {
            rows,
            pending: None,
            finished: false,
            width: self.stmt.columns.len(),
            lease: self,
        })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.stmt.release();
    }
}

/// Outcome of one `Execution::step`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// One raw row of native values.
    Row(Vec<Value>),
    /// No more rows.
    Done,
}

/// A running, row-returning execution of one statement.
pub struct Execution {
    rows: libsql::Rows,
    pending: Option<Vec<Value>>,
    finished: bool,
    width: usize,
    // Dropped last so the engine rows are gone before the statement is reset.
    lease: Lease,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("sql", &self.lease.stmt.sql)
            .field("finished", &self.finished)
            .field("buffered", &self.pending.is_some())
            .finish()
    }
}

impl Execution {
    pub fn statement(&self) -> &Statement {
        self.lease.statement()
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_none()
    }

    /// Advance the engine by one row.
    pub fn step(&mut self) -> Result<StepResult> {
        if let Some(row) = self.pending.take() {
            return Ok(StepResult::Row(row));
        }
        if self.finished {
            return Ok(StepResult::Done);
        }

        let next = TOKIO_RUNTIME.block_on(self.rows.next());
        let next = match next {
            Ok(next) => next,
            Err(e) => {
                self.finished = true;
                return Err(Error::from_engine(e, &self.lease.stmt.sql));
            }
        };

        match next {
            Some(row) => {
                let values = (0..self.width)
                    .map(|i| {
                        let idx = i32::try_from(i).map_err(|e| {
                            Error::sql(format!("column index out of range: {e}"), &self.lease.stmt.sql)
                        })?;
                        row.get_value(idx)
                            .map(decode::from_engine_value)
                            .map_err(|e| Error::from_engine(e, &self.lease.stmt.sql))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(StepResult::Row(values))
            }
            None => {
                self.finished = true;
                Ok(StepResult::Done)
            }
        }
    }

    /// Step once and keep the row buffered, so engine errors surface now.
    pub(crate) fn prime(&mut self) -> Result<()> {
        if let StepResult::Row(row) = self.step()? {
            self.pending = Some(row);
        }
        Ok(())
    }
}
