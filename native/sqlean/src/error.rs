//! Error taxonomy for the binding layer.
//!
//! Every failure that reaches a caller is one of the [`Error`] variants.
//! Engine diagnostics are carried verbatim.

use crate::constants::SQLITE_INTERRUPT;
use std::fmt;
use thiserror::Error;

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], convenient for matching in callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening or closing a connection failed.
    Connection,
    /// The engine rejected a statement at compile or execution time.
    Sql,
    /// Parameter arity or names did not match the statement.
    Bind,
    /// A value could not be adapted to, or converted from, its engine form.
    Adaptation,
    /// An operation was called out of order.
    Sequencing,
    /// The connection, cursor, statement or blob is closed.
    UseAfterClose,
    /// The engine aborted execution because of an interrupt request.
    Interrupted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "ConnectionError",
            Self::Sql => "SQLError",
            Self::Bind => "BindError",
            Self::Adaptation => "AdaptationError",
            Self::Sequencing => "SequencingError",
            Self::UseAfterClose => "UseAfterCloseError",
            Self::Interrupted => "InterruptedError",
        };
        f.write_str(name)
    }
}

/// Error returned by binding operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Open/close failures, including extension loading and poisoned locks.
    #[error("connection error: {0}")]
    Connection(String),

    /// Engine-reported compile or execution failure.
    #[error("{message} (sql: {sql:?})")]
    Sql {
        /// Diagnostic text from the engine.
        message: String,
        /// SQLite result code, when the engine reported one.
        code: Option<i32>,
        /// Statement text that failed.
        sql: String,
    },

    /// Parameter arity or name mismatch.
    #[error("bind error: {message}")]
    Bind {
        /// What was wrong with the supplied parameters.
        message: String,
        /// 1-based parameter index, if one parameter is at fault.
        index: Option<usize>,
        /// Parameter name, if a named parameter is at fault.
        name: Option<String>,
    },

    /// No applicable encoder/decoder, or the codec rejected the value.
    #[error("adaptation error for {type_name}: {message}")]
    Adaptation {
        /// Rust type name or declared column type involved.
        type_name: String,
        /// Details, including parameter index or column where known.
        message: String,
        /// 1-based parameter index when adapting a bound parameter.
        index: Option<usize>,
    },

    /// Operation called in the wrong order, or rejected by the transaction state.
    #[error("sequencing error: {0}")]
    Sequencing(String),

    /// Operation on a closed connection, cursor, statement or blob.
    #[error("cannot operate on a closed {0}")]
    UseAfterClose(&'static str),

    /// Execution aborted by `Connection::interrupt`.
    #[error("interrupted: {message} (sql: {sql:?})")]
    Interrupted {
        /// Diagnostic text from the engine.
        message: String,
        /// Statement text that was running.
        sql: String,
    },
}

impl Error {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Sql { .. } => ErrorKind::Sql,
            Self::Bind { .. } => ErrorKind::Bind,
            Self::Adaptation { .. } => ErrorKind::Adaptation,
            Self::Sequencing(_) => ErrorKind::Sequencing,
            Self::UseAfterClose(_) => ErrorKind::UseAfterClose,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
        }
    }

    /// Builds an adaptation error; intended for use inside user encoders and decoders.
    pub fn adaptation(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adaptation {
            type_name: type_name.into(),
            message: message.into(),
            index: None,
        }
    }

    pub(crate) fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
            index: None,
            name: None,
        }
    }

    pub(crate) fn sql(message: impl Into<String>, sql: &str) -> Self {
        Self::Sql {
            message: message.into(),
            code: None,
            sql: sql.to_string(),
        }
    }

    /// Classify a libsql error raised while running `sql`.
    ///
    /// `SQLITE_INTERRUPT` maps to [`Error::Interrupted`]; every other engine
    /// failure becomes [`Error::Sql`] with the engine's message untouched.
    pub(crate) fn from_engine(err: libsql::Error, sql: &str) -> Self {
        match err {
            libsql::Error::SqliteFailure(code, message) => {
                if code & 0xff == SQLITE_INTERRUPT {
                    Self::Interrupted {
                        message,
                        sql: sql.to_string(),
                    }
                } else {
                    Self::Sql {
                        message,
                        code: Some(code),
                        sql: sql.to_string(),
                    }
                }
            }
            other => {
                let message = other.to_string();
                if message.contains("interrupted") {
                    Self::Interrupted {
                        message,
                        sql: sql.to_string(),
                    }
                } else {
                    Self::Sql {
                        message,
                        code: None,
                        sql: sql.to_string(),
                    }
                }
            }
        }
    }

    /// Attach a 1-based parameter index to a bind or adaptation error.
    pub(crate) fn at_parameter(self, position: usize) -> Self {
        match self {
            Self::Adaptation {
                type_name, message, ..
            } => Self::Adaptation {
                type_name,
                message: format!("parameter {position}: {message}"),
                index: Some(position),
            },
            Self::Bind { message, name, .. } => Self::Bind {
                message,
                index: Some(position),
                name,
            },
            other => other,
        }
    }
}
