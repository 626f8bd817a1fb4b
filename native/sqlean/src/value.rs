//! Application values and statement parameters.
//!
//! [`Value`] covers the engine-native scalar shapes plus [`Value::Custom`],
//! an opaque application value that must be adapted through the
//! [`AdaptationRegistry`](crate::AdaptationRegistry) before it can be bound.

use chrono::{NaiveDate, NaiveDateTime};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An application value that is not one of the native scalar shapes.
#[derive(Clone)]
pub struct CustomValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CustomValue {
    /// Wraps any shareable value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `TypeId` of the wrapped value (not of the `Arc`).
    pub fn type_id(&self) -> TypeId {
        Any::type_id(&*self.inner)
    }

    /// Borrow the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Borrow the wrapped value as `&dyn Any`.
    pub fn as_any(&self) -> &dyn Any {
        &*self.inner
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue<{}>", self.type_name)
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A value bound to a statement parameter or read from a result column.
///
/// Booleans are native as well; they are stored as `Integer(0 | 1)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
    /// Application value that needs an adapter to reach the engine.
    Custom(CustomValue),
}

impl Value {
    /// Wraps an application value.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(CustomValue::new(value))
    }

    /// `true` for every variant except [`Value::Custom`].
    pub fn is_native(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow a custom value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom(c) => c.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short name of the value's type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Custom(c) => c.type_name(),
        }
    }

    /// The payload as `&dyn Any`, keyed by its Rust type for adapter lookup.
    ///
    /// Native variants expose their payload type (`i64`, `f64`, `String`,
    /// `Vec<u8>`); NULL has no payload.
    pub(crate) fn payload(&self) -> Option<&dyn Any> {
        match self {
            Self::Null => None,
            Self::Integer(v) => Some(v as &dyn Any),
            Self::Real(v) => Some(v as &dyn Any),
            Self::Text(v) => Some(v as &dyn Any),
            Self::Blob(v) => Some(v as &dyn Any),
            Self::Custom(c) => Some(c.as_any()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::custom(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::custom(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Parameters for one statement execution: positional or named, never both.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    /// No parameters.
    #[default]
    None,
    /// Values bound by position (`?`, `?NNN`).
    Positional(Vec<Value>),
    /// Values bound by name (`:name`, `@name`, `$name`); keys may omit the prefix.
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Number of supplied values.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Self::Named(pairs)
    }
}

/// Build positional [`Params`].
///
/// Usage: `params![1_i64, "text", NaiveDate::from_ymd_opt(2020, 1, 2)]`
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::None
    };
    ($($val:expr),+ $(,)?) => {
        $crate::Params::Positional(vec![$($crate::Value::from($val)),+])
    };
}

/// Build named [`Params`].
///
/// Usage: `named_params! { "id" => 1_i64, ":name" => "alice" }`
#[macro_export]
macro_rules! named_params {
    ($($key:expr => $val:expr),* $(,)?) => {
        $crate::Params::Named(vec![$((($key).to_string(), $crate::Value::from($val))),*])
    };
}
