//! Materialized result rows.
//!
//! A [`Row`] is addressable by position and, case-insensitively, by column
//! name. It shares only the immutable column list of the execution that
//! produced it, so it stays valid after the cursor advances or closes.

use crate::adaptation::Converter;
use crate::decode;
use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

/// Column names of one result shape, shared by all rows of an execution.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RowColumns {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl RowColumns {
    pub(crate) fn new(names: Vec<String>) -> Self {
        let mut lookup = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // First column wins when names repeat.
            lookup.entry(name.to_lowercase()).or_insert(i);
        }
        Self { names, lookup }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(&name.to_lowercase()).copied()
    }
}

/// Converter chosen for one column, with the declared type that selected it.
pub(crate) type ColumnDecoder = Option<(String, Converter)>;

/// One result row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<RowColumns>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from raw engine values, running each column's converter.
    ///
    /// NULL is never handed to a converter.
    pub(crate) fn materialize(
        columns: &Arc<RowColumns>,
        decoders: &[ColumnDecoder],
        raw: Vec<Value>,
    ) -> Result<Self> {
        let values = raw
            .into_iter()
            .enumerate()
            .map(|(i, value)| match decoders.get(i) {
                Some(Some((decl_type, convert))) => match decode::raw_bytes(&value) {
                    Some(bytes) => convert(&bytes).map_err(|e| {
                        annotate_column(e, decl_type, columns.names.get(i).map_or("?", String::as_str))
                    }),
                    None => Ok(value),
                },
                _ => Ok(value),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns: Arc::clone(columns),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the column called `name`, ignoring case.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.values.get(i))
    }

    /// Column names in order.
    pub fn keys(&self) -> &[String] {
        &self.columns.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn annotate_column(err: Error, decl_type: &str, column: &str) -> Error {
    match err {
        Error::Adaptation { message, .. } => Error::Adaptation {
            type_name: decl_type.to_string(),
            message: format!("column {column:?}: {message}"),
            index: None,
        },
        other => other,
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.columns.names == other.columns.names && self.values == other.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl Index<&str> for Row {
    type Output = Value;

    #[allow(clippy::panic)]
    fn index(&self, name: &str) -> &Value {
        match self.get_named(name) {
            Some(value) => value,
            None => panic!("no column named {name:?} in row"),
        }
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
