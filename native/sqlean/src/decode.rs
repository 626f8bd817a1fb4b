/// Conversion between binding values and libsql engine values
///
/// The engine only understands its five native shapes. Values reaching these
/// helpers have already been through the adaptation registry.
use crate::error::Error;
use crate::value::Value;

/// Convert an adapted (native) value into a libsql value
///
/// Returns an adaptation error if a custom value slipped through unadapted.
pub fn to_engine_value(value: Value) -> Result<libsql::Value, Error> {
    match value {
        Value::Null => Ok(libsql::Value::Null),
        Value::Integer(v) => Ok(libsql::Value::Integer(v)),
        Value::Real(v) => Ok(libsql::Value::Real(v)),
        Value::Text(v) => Ok(libsql::Value::Text(v)),
        Value::Blob(v) => Ok(libsql::Value::Blob(v)),
        Value::Custom(c) => Err(Error::adaptation(
            c.type_name(),
            "value was not adapted to a native engine type",
        )),
    }
}

/// Convert a libsql value read from a column into a binding value
pub fn from_engine_value(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(v) => Value::Integer(v),
        libsql::Value::Real(v) => Value::Real(v),
        libsql::Value::Text(v) => Value::Text(v),
        libsql::Value::Blob(v) => Value::Blob(v),
    }
}

/// Raw bytes handed to a converter
///
/// Text and blobs are passed as stored; numbers use their decimal text form,
/// the same bytes the engine yields when a numeric column is read as a blob.
pub fn raw_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null | Value::Custom(_) => None,
        Value::Integer(v) => Some(v.to_string().into_bytes()),
        Value::Real(v) => Some(format_real(*v).into_bytes()),
        Value::Text(v) => Some(v.as_bytes().to_vec()),
        Value::Blob(v) => Some(v.clone()),
    }
}

/// Render a REAL the way SQLite prints it: integral values keep a `.0`
fn format_real(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}
