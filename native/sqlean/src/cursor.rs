/// Cursor operations for sqlean connections.
///
/// This module handles executing statements and iterating their rows:
/// - `execute` compiles (or reuses) a statement, binds, opens the implicit
///   transaction for data-modifying statements and steps the first row
/// - `fetch_one` / `fetch_many` / `fetch_all` and `Iterator` drain the rows
/// - `execute_many` runs one data-modifying statement per parameter set
/// - `execute_script` runs a parameterless multi-statement script
///
/// A cursor's state lives in a slot inside its connection, keyed by the
/// cursor's id, so closing the connection invalidates every cursor at once.
use crate::adaptation::AdaptationRegistry;
use crate::connection::{ConnectionState, Shared};
use crate::constants::{DEFAULT_ARRAYSIZE, TOKIO_RUNTIME};
use crate::error::{Error, Result};
use crate::models::{ColumnDescription, DetectTypes, ManyOutcome, ManyPolicy};
use crate::row::{ColumnDecoder, Row, RowColumns};
use crate::statement::{Execution, StepResult};
use crate::transaction;
use crate::utils::{detect_query_type, safe_read, split_colname_type};
use crate::value::Params;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Per-cursor state kept in the connection.
pub(crate) struct CursorSlot {
    active: Option<Execution>,
    executed: bool,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    description: Vec<ColumnDescription>,
    shape: Arc<RowColumns>,
    decoders: Vec<ColumnDecoder>,
}

impl CursorSlot {
    fn new() -> Self {
        Self {
            active: None,
            executed: false,
            rowcount: -1,
            lastrowid: None,
            arraysize: DEFAULT_ARRAYSIZE,
            description: Vec::new(),
            shape: Arc::new(RowColumns::new(Vec::new())),
            decoders: Vec::new(),
        }
    }

    /// Drop the running execution, returning its statement to the cache.
    pub(crate) fn release_execution(&mut self) {
        self.active = None;
    }

    fn begin(&mut self) {
        self.release_execution();
        self.executed = false;
        self.rowcount = -1;
        self.description.clear();
        self.shape = Arc::new(RowColumns::new(Vec::new()));
        self.decoders.clear();
    }

    fn set_shape(&mut self, columns: &[ColumnDescription], detect: DetectTypes, registry: &AdaptationRegistry) {
        let mut description = Vec::with_capacity(columns.len());
        let mut decoders = Vec::with_capacity(columns.len());

        for column in columns {
            let (name, colname_type) = if detect.colnames {
                split_colname_type(&column.name)
            } else {
                (column.name.clone(), None)
            };

            // A `[type]` in the column name wins over the declared type.
            let selected = colname_type.or_else(|| {
                if detect.decltypes {
                    column.decl_type.clone()
                } else {
                    None
                }
            });
            decoders.push(selected.and_then(|decl| {
                registry.converter(&decl).map(|convert| (decl, convert))
            }));

            description.push(ColumnDescription {
                name,
                decl_type: column.decl_type.clone(),
            });
        }

        self.shape = Arc::new(RowColumns::new(
            description.iter().map(|c| c.name.clone()).collect(),
        ));
        self.description = description;
        self.decoders = decoders;
    }
}

fn slot<'a>(state: &'a mut ConnectionState, id: &Uuid) -> Result<&'a mut CursorSlot> {
    state.cursors.get_mut(id).ok_or(Error::UseAfterClose("cursor"))
}

/// Iteration context for statements run on one connection.
pub struct Cursor {
    shared: Arc<Shared>,
    id: Uuid,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("id", &self.id).finish()
    }
}

impl Cursor {
    pub(crate) fn new(shared: Arc<Shared>) -> Result<Self> {
        let id = Uuid::new_v4();
        shared
            .lock("Cursor::new")?
            .cursors
            .insert(id, CursorSlot::new());
        Ok(Self { shared, id })
    }

    /// Run one statement, leaving the cursor positioned before its first row.
    ///
    /// A previous execution on this cursor is discarded first. Bind errors are
    /// raised before anything reaches the engine.
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<&mut Self> {
        let params = params.into();
        let shared = Arc::clone(&self.shared);
        let mut guard = shared.lock("Cursor::execute")?;
        let state = &mut *guard;

        slot(state, &self.id)?.begin();
        state.transaction.ensure_usable("execute")?;

        let engine = state.engine()?;
        let lease = state.cache.get_or_compile(&engine, sql)?;
        let query_type = detect_query_type(sql);

        let bound = {
            let registry = safe_read(&shared.registry, "Cursor::execute registry")?;
            let bound = lease.statement().bind(&params, &registry)?;
            slot(state, &self.id)?.set_shape(lease.statement().columns(), shared.detect_types, &registry);
            bound
        };

        if query_type.is_dml() {
            transaction::begin_implicit(&engine, shared.isolation, &mut state.transaction)?;
        }

        if lease.statement().columns().is_empty() {
            let changes = match lease.execute(bound) {
                Ok(changes) => changes,
                Err(e) => {
                    state.fail_transaction();
                    return Err(e);
                }
            };
            drop(lease);
            state.sync_transaction(&engine);

            let slot = slot(state, &self.id)?;
            slot.executed = true;
            slot.rowcount = if query_type.is_dml() {
                i64::try_from(changes).unwrap_or(i64::MAX)
            } else {
                -1
            };
            if query_type.sets_lastrowid() {
                slot.lastrowid = Some(engine.last_insert_rowid());
            }
            return Ok(self);
        }

        let execution = match lease.query(bound).and_then(|mut execution| {
            execution.prime()?;
            Ok(execution)
        }) {
            Ok(execution) => execution,
            Err(e) => {
                state.fail_transaction();
                return Err(e);
            }
        };
        state.sync_transaction(&engine);

        let slot = slot(state, &self.id)?;
        slot.executed = true;
        if query_type.sets_lastrowid() {
            slot.lastrowid = Some(engine.last_insert_rowid());
        }
        // An empty result gives its statement back to the cache right away.
        if !execution.is_finished() {
            slot.active = Some(execution);
        }
        Ok(self)
    }

    /// Run one data-modifying statement once per parameter set, using the
    /// connection's failure policy.
    pub fn execute_many<I, P>(&mut self, sql: &str, param_sets: I) -> Result<ManyOutcome>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let policy = self.shared.many_policy;
        self.execute_many_with(sql, param_sets, policy)
    }

    /// Like [`Cursor::execute_many`] with an explicit failure policy.
    ///
    /// Under `StopOnError` the first failure is returned; a transaction begun
    /// by this call is rolled back, one that was already open is marked
    /// failed. Under `Continue` failures are collected and the transaction
    /// stays open.
    pub fn execute_many_with<I, P>(
        &mut self,
        sql: &str,
        param_sets: I,
        policy: ManyPolicy,
    ) -> Result<ManyOutcome>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let shared = Arc::clone(&self.shared);
        let mut guard = shared.lock("Cursor::execute_many")?;
        let state = &mut *guard;

        slot(state, &self.id)?.begin();
        state.transaction.ensure_usable("execute_many")?;

        let engine = state.engine()?;
        let lease = state.cache.get_or_compile(&engine, sql)?;
        if !lease.statement().columns().is_empty() {
            return Err(Error::Sequencing(
                "execute_many cannot run statements that return rows".to_string(),
            ));
        }

        let query_type = detect_query_type(sql);
        let registry = safe_read(&shared.registry, "Cursor::execute_many registry")?;
        let mut outcome = ManyOutcome::default();
        let mut began = false;
        let mut total: u64 = 0;
        let mut lastrowid = None;

        for (index, params) in param_sets.into_iter().enumerate() {
            let params = params.into();
            let mut reached_engine = false;
            let run = lease
                .statement()
                .bind(&params, &registry)
                .and_then(|bound| {
                    if query_type.is_dml() {
                        began |= transaction::begin_implicit(
                            &engine,
                            shared.isolation,
                            &mut state.transaction,
                        )?;
                    }
                    reached_engine = true;
                    lease.execute(bound)
                });

            match run {
                Ok(changes) => {
                    total += changes;
                    outcome.executed += 1;
                    if query_type.sets_lastrowid() {
                        lastrowid = Some(engine.last_insert_rowid());
                    }
                }
                Err(e) if policy == ManyPolicy::Continue => outcome.failures.push((index, e)),
                Err(e) => {
                    drop(registry);
                    drop(lease);
                    if began {
                        if let Err(rollback_err) = state.rollback() {
                            warn!(error = %rollback_err, "rollback after execute_many failure failed");
                        }
                    } else if reached_engine {
                        // Bind errors never touched the engine and leave the state alone.
                        state.fail_transaction();
                    }
                    if let Ok(slot) = slot(state, &self.id) {
                        slot.executed = true;
                        // Rows inserted before the failure survive unless rolled back.
                        if !began && lastrowid.is_some() {
                            slot.lastrowid = lastrowid;
                        }
                    }
                    return Err(e);
                }
            }
        }

        drop(registry);
        drop(lease);
        state.sync_transaction(&engine);

        let slot = slot(state, &self.id)?;
        slot.executed = true;
        slot.rowcount = if query_type.is_dml() {
            i64::try_from(total).unwrap_or(i64::MAX)
        } else {
            -1
        };
        if lastrowid.is_some() {
            slot.lastrowid = lastrowid;
        }
        Ok(outcome)
    }

    /// Run a parameterless script of `;`-separated statements.
    ///
    /// A pending implicit transaction is committed first.
    pub fn execute_script(&mut self, sql: &str) -> Result<&mut Self> {
        let shared = Arc::clone(&self.shared);
        let mut guard = shared.lock("Cursor::execute_script")?;
        let state = &mut *guard;

        slot(state, &self.id)?.begin();
        state.transaction.ensure_usable("execute_script")?;

        let engine = state.engine()?;
        if !engine.is_autocommit() {
            state.commit()?;
        }

        if let Err(e) = TOKIO_RUNTIME
            .block_on(engine.execute_batch(sql))
            .map_err(|e| Error::from_engine(e, sql))
        {
            state.sync_transaction(&engine);
            state.fail_transaction();
            return Err(e);
        }
        state.sync_transaction(&engine);

        slot(state, &self.id)?.executed = true;
        Ok(self)
    }

    /// Next row, or `None` when the rows are exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        let mut guard = self.shared.lock("Cursor::fetch_one")?;
        let state = &mut *guard;
        let slot = slot(state, &self.id)?;
        if !slot.executed {
            return Err(Error::Sequencing(
                "fetch called before a successful execute".to_string(),
            ));
        }

        let Some(execution) = slot.active.as_mut() else {
            return Ok(None);
        };
        match execution.step() {
            Ok(StepResult::Row(raw)) => Row::materialize(&slot.shape, &slot.decoders, raw).map(Some),
            Ok(StepResult::Done) => {
                slot.release_execution();
                Ok(None)
            }
            Err(e) => {
                slot.release_execution();
                state.fail_transaction();
                Err(e)
            }
        }
    }

    /// Up to `size` further rows.
    pub fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(size.min(1024));
        while rows.len() < size {
            match self.fetch_one()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Up to `arraysize` further rows.
    pub fn fetch_many_default(&mut self) -> Result<Vec<Row>> {
        let size = self.arraysize()?;
        self.fetch_many(size)
    }

    /// Every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Discard pending rows and make the cursor unusable.
    ///
    /// The statement goes back to the cache. Closing twice does nothing;
    /// closing after the connection closed does nothing either.
    pub fn close(&mut self) -> Result<()> {
        if self.shared.is_closed() {
            return Ok(());
        }
        self.shared.lock("Cursor::close")?.cursors.remove(&self.id);
        Ok(())
    }

    /// Columns of the last execution; empty for statements without rows.
    pub fn description(&self) -> Result<Vec<ColumnDescription>> {
        let mut guard = self.shared.lock("Cursor::description")?;
        Ok(slot(&mut guard, &self.id)?.description.clone())
    }

    /// Rows changed by the last data-modifying execution; `-1` otherwise.
    pub fn rowcount(&self) -> Result<i64> {
        let mut guard = self.shared.lock("Cursor::rowcount")?;
        Ok(slot(&mut guard, &self.id)?.rowcount)
    }

    /// Rowid of the last row inserted through this cursor.
    pub fn lastrowid(&self) -> Result<Option<i64>> {
        let mut guard = self.shared.lock("Cursor::lastrowid")?;
        Ok(slot(&mut guard, &self.id)?.lastrowid)
    }

    pub fn arraysize(&self) -> Result<usize> {
        let mut guard = self.shared.lock("Cursor::arraysize")?;
        Ok(slot(&mut guard, &self.id)?.arraysize)
    }

    pub fn set_arraysize(&mut self, size: usize) -> Result<()> {
        let mut guard = self.shared.lock("Cursor::set_arraysize")?;
        slot(&mut guard, &self.id)?.arraysize = size.max(1);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self.shared.lock("Cursor::is_closed") {
            Ok(guard) => !guard.cursors.contains_key(&self.id),
            Err(_) => true,
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_one().transpose()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.shared.is_closed() {
            return;
        }
        match self.shared.lock("Cursor::drop") {
            Ok(mut guard) => {
                guard.cursors.remove(&self.id);
            }
            Err(e) => warn!(cursor = %self.id, error = %e, "failed to release cursor on drop"),
        }
    }
}
