/// Transaction state tracking for sqlean connections.
///
/// This module handles the connection-level transaction state machine:
/// - IDLE → ACTIVE when a data-modifying statement opens the implicit transaction
/// - ACTIVE → IDLE on commit or rollback
/// - ACTIVE → FAILED when a statement fails during execution
/// - FAILED → IDLE on rollback (the only accepted operation)
///
/// After every successful statement the state is re-read from the engine's
/// autocommit flag, so `BEGIN`/`COMMIT` issued as plain SQL are tracked too.
use crate::constants::TOKIO_RUNTIME;
use crate::error::{Error, Result};
use crate::models::IsolationLevel;
use tracing::debug;

/// Where the connection stands with respect to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No open transaction.
    #[default]
    Idle,
    /// A transaction is open.
    Active,
    /// A statement failed inside the open transaction; only rollback is accepted.
    Failed,
}

impl TransactionState {
    /// Reject work while the transaction has failed.
    pub(crate) fn ensure_usable(self, operation: &str) -> Result<()> {
        if self == Self::Failed {
            return Err(Error::Sequencing(format!(
                "cannot {operation}: the current transaction failed and must be rolled back"
            )));
        }
        Ok(())
    }

    /// State after a statement succeeded, given the engine's autocommit flag.
    pub(crate) fn after_success(self, autocommit: bool) -> Self {
        match self {
            Self::Failed => Self::Failed,
            _ if autocommit => Self::Idle,
            _ => Self::Active,
        }
    }

    /// State after a statement failed during execution.
    pub(crate) fn after_failure(self) -> Self {
        match self {
            Self::Active => Self::Failed,
            other => other,
        }
    }
}

/// Open the implicit transaction if a data-modifying statement needs one.
///
/// Returns whether a transaction was begun by this call.
pub(crate) fn begin_implicit(
    engine: &libsql::Connection,
    isolation: IsolationLevel,
    state: &mut TransactionState,
) -> Result<bool> {
    let Some(begin) = isolation.begin_sql() else {
        return Ok(false);
    };
    if *state != TransactionState::Idle || !engine.is_autocommit() {
        return Ok(false);
    }

    run_control(engine, begin)?;
    *state = TransactionState::Active;
    debug!(statement = begin, "began implicit transaction");
    Ok(true)
}

/// Commit the open transaction, if the engine has one.
pub(crate) fn commit(engine: &libsql::Connection, state: &mut TransactionState) -> Result<()> {
    state.ensure_usable("commit")?;
    if !engine.is_autocommit() {
        run_control(engine, "COMMIT")?;
        debug!("committed transaction");
    }
    *state = TransactionState::Idle;
    Ok(())
}

/// Roll back the open transaction, if the engine still has one.
pub(crate) fn rollback(engine: &libsql::Connection, state: &mut TransactionState) -> Result<()> {
    if !engine.is_autocommit() {
        run_control(engine, "ROLLBACK")?;
        debug!(previous = ?state, "rolled back transaction");
    }
    *state = TransactionState::Idle;
    Ok(())
}

fn run_control(engine: &libsql::Connection, sql: &str) -> Result<()> {
    TOKIO_RUNTIME
        .block_on(engine.execute(sql, ()))
        .map(|_| ())
        .map_err(|e| Error::from_engine(e, sql))
}
