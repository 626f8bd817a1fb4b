//! Type adaptation registry.
//!
//! Two directions:
//! - **adapt**: application value → engine-native value, selected by the
//!   value's Rust type (exact `TypeId` first, then registered protocols in
//!   registration order). Native values without an adapter pass through.
//! - **convert**: raw column bytes → application value, selected by the
//!   column's declared type name (case-insensitive, parenthetical suffix
//!   stripped). Without a converter the raw bytes come back as a blob.
//!
//! The process-wide registry behind [`global`] is shared mutable state with
//! last-write-wins semantics: a registration is visible to every connection
//! using the global registry, including ones already open. Callers that need
//! isolation open their connections with `OpenOptions::registry` and a
//! private [`AdaptationRegistry`].

use crate::error::{Error, Result};
use crate::utils::{normalize_decl_type, safe_write};
use crate::value::Value;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Encoder stored for one Rust type.
type EncodeFn = Arc<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;

/// Probe for a protocol: `None` when the value does not implement it.
pub type ProbeFn = Arc<dyn Fn(&dyn Any) -> Option<Result<Value>> + Send + Sync>;

/// Decoder for one declared type.
pub type Converter = Arc<dyn Fn(&[u8]) -> Result<Value> + Send + Sync>;

/// Shared handle to a registry, as held by connections.
pub type Registry = Arc<RwLock<AdaptationRegistry>>;

struct Adapter {
    type_name: &'static str,
    encode: EncodeFn,
}

struct Protocol {
    name: String,
    probe: ProbeFn,
}

/// Adapters and converters for application types.
#[derive(Default)]
pub struct AdaptationRegistry {
    adapters: HashMap<TypeId, Adapter>,
    protocols: Vec<Protocol>,
    converters: HashMap<String, Converter>,
}

impl fmt::Debug for AdaptationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adapters: Vec<&str> = self.adapters.values().map(|a| a.type_name).collect();
        let protocols: Vec<&str> = self.protocols.iter().map(|p| p.name.as_str()).collect();
        let converters: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        f.debug_struct("AdaptationRegistry")
            .field("adapters", &adapters)
            .field("protocols", &protocols)
            .field("converters", &converters)
            .finish()
    }
}

impl AdaptationRegistry {
    /// An empty registry: natives pass through, nothing else adapts.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the date and timestamp defaults installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_defaults();
        registry
    }

    /// Store (or overwrite) the encoder for `T`.
    pub fn register_adapter<T, F>(&mut self, encode: F)
    where
        T: Any,
        F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let encode: EncodeFn = Arc::new(move |any: &dyn Any| match any.downcast_ref::<T>() {
            Some(value) => encode(value),
            None => Err(Error::adaptation(type_name, "adapter received a value of another type")),
        });
        self.adapters
            .insert(TypeId::of::<T>(), Adapter { type_name, encode });
    }

    /// Store (or replace in place) a protocol probe, tried after exact-type adapters.
    pub fn register_protocol<F>(&mut self, name: &str, probe: F)
    where
        F: Fn(&dyn Any) -> Option<Result<Value>> + Send + Sync + 'static,
    {
        let probe: ProbeFn = Arc::new(probe);
        match self.protocols.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.probe = probe,
            None => self.protocols.push(Protocol {
                name: name.to_string(),
                probe,
            }),
        }
    }

    /// Store (or overwrite) the decoder for a declared type name.
    pub fn register_converter<F>(&mut self, decl_type: &str, decode: F)
    where
        F: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.converters
            .insert(normalize_decl_type(decl_type), Arc::new(decode));
    }

    /// Remove the encoder for `T`; returns whether one was registered.
    pub fn unregister_adapter<T: Any>(&mut self) -> bool {
        self.adapters.remove(&TypeId::of::<T>()).is_some()
    }

    /// Remove the decoder for a declared type; returns whether one was registered.
    pub fn unregister_converter(&mut self, decl_type: &str) -> bool {
        self.converters
            .remove(&normalize_decl_type(decl_type))
            .is_some()
    }

    /// Adapt an application value to its engine-native form.
    pub fn adapt(&self, value: &Value) -> Result<Value> {
        let Some(payload) = value.payload() else {
            return Ok(Value::Null);
        };

        if let Some(adapter) = self.adapters.get(&Any::type_id(payload)) {
            let adapted = (adapter.encode)(payload)?;
            return ensure_native(adapted, adapter.type_name);
        }

        for protocol in &self.protocols {
            if let Some(result) = (protocol.probe)(payload) {
                return ensure_native(result?, value.type_name());
            }
        }

        if value.is_native() {
            Ok(value.clone())
        } else {
            Err(Error::adaptation(
                value.type_name(),
                "no adapter registered and the value is not natively representable",
            ))
        }
    }

    /// Convert raw column bytes tagged with a declared type.
    ///
    /// Without a matching converter the bytes are returned unchanged as a blob.
    pub fn convert(&self, decl_type: &str, raw: &[u8]) -> Result<Value> {
        match self.converter(decl_type) {
            Some(decode) => decode(raw),
            None => Ok(Value::Blob(raw.to_vec())),
        }
    }

    /// Decoder for a declared type, if one is registered.
    pub fn converter(&self, decl_type: &str) -> Option<Converter> {
        self.converters.get(&normalize_decl_type(decl_type)).cloned()
    }

    pub fn has_adapter<T: Any>(&self) -> bool {
        self.adapters.contains_key(&TypeId::of::<T>())
    }

    fn install_defaults(&mut self) {
        self.register_adapter::<NaiveDate, _>(|d| Ok(Value::Text(adapt_date(d))));
        self.register_adapter::<NaiveDateTime, _>(|ts| Ok(Value::Text(adapt_timestamp(ts))));
        self.register_converter("date", |raw| convert_date(raw).map(Value::custom));
        self.register_converter("timestamp", |raw| convert_timestamp(raw).map(Value::custom));
    }
}

fn ensure_native(value: Value, type_name: &str) -> Result<Value> {
    if value.is_native() {
        Ok(value)
    } else {
        Err(Error::adaptation(
            type_name,
            format!("adapter produced a non-native value ({})", value.type_name()),
        ))
    }
}

static GLOBAL: Lazy<Registry> =
    Lazy::new(|| Arc::new(RwLock::new(AdaptationRegistry::with_defaults())));

/// Handle to the process-wide registry.
pub fn global() -> Registry {
    Arc::clone(&GLOBAL)
}

/// Build the process-wide registry now rather than on first use.
pub fn init() {
    Lazy::force(&GLOBAL);
}

/// Restore the process-wide registry to its defaults.
pub fn reset() -> Result<()> {
    *safe_write(&GLOBAL, "adaptation::reset")? = AdaptationRegistry::with_defaults();
    Ok(())
}

/// Register an adapter in the process-wide registry (last write wins).
pub fn register_adapter<T, F>(encode: F) -> Result<()>
where
    T: Any,
    F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
{
    safe_write(&GLOBAL, "adaptation::register_adapter")?.register_adapter::<T, F>(encode);
    Ok(())
}

/// Register a protocol probe in the process-wide registry.
pub fn register_protocol<F>(name: &str, probe: F) -> Result<()>
where
    F: Fn(&dyn Any) -> Option<Result<Value>> + Send + Sync + 'static,
{
    safe_write(&GLOBAL, "adaptation::register_protocol")?.register_protocol(name, probe);
    Ok(())
}

/// Register a converter in the process-wide registry (last write wins).
pub fn register_converter<F>(decl_type: &str, decode: F) -> Result<()>
where
    F: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
{
    safe_write(&GLOBAL, "adaptation::register_converter")?.register_converter(decl_type, decode);
    Ok(())
}

/// ISO 8601 date, e.g. `2020-01-02`.
pub fn adapt_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// ISO 8601 timestamp with a space separator; the fraction appears only when non-zero.
pub fn adapt_timestamp(ts: &NaiveDateTime) -> String {
    let micros = ts.nanosecond() / 1_000;
    if micros == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        format!("{}.{micros:06}", ts.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn parse_fields(raw: &str, sep: char, expected: usize, what: &str) -> Result<Vec<u32>> {
    let fields: Vec<u32> = raw
        .split(sep)
        .map(|part| part.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::adaptation(what, format!("invalid {what} {raw:?}: {e}")))?;
    if fields.len() != expected {
        return Err(Error::adaptation(
            what,
            format!("invalid {what} {raw:?}: expected {expected} fields"),
        ));
    }
    Ok(fields)
}

fn utf8<'a>(raw: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(raw).map_err(|e| Error::adaptation(what, format!("invalid UTF-8: {e}")))
}

/// Parse `YYYY-MM-DD`.
pub fn convert_date(raw: &[u8]) -> Result<NaiveDate> {
    let text = utf8(raw, "date")?;
    let ymd = parse_fields(text, '-', 3, "date")?;
    let year = i32::try_from(ymd[0])
        .map_err(|e| Error::adaptation("date", format!("invalid year in {text:?}: {e}")))?;
    NaiveDate::from_ymd_opt(year, ymd[1], ymd[2])
        .ok_or_else(|| Error::adaptation("date", format!("date out of range: {text:?}")))
}

/// Parse `YYYY-MM-DD HH:MM:SS[.ffffff]`; the fraction is padded or truncated to microseconds.
pub fn convert_timestamp(raw: &[u8]) -> Result<NaiveDateTime> {
    let text = utf8(raw, "timestamp")?;
    let (date_part, time_part) = text
        .split_once([' ', 'T'])
        .ok_or_else(|| Error::adaptation("timestamp", format!("invalid timestamp {text:?}")))?;
    let date = convert_date(date_part.as_bytes())
        .map_err(|_| Error::adaptation("timestamp", format!("invalid date in {text:?}")))?;

    let (clock, fraction) = match time_part.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (time_part, None),
    };
    let hms = parse_fields(clock, ':', 3, "timestamp")?;

    let micros = match fraction {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            let padded: String = digits.chars().chain(std::iter::repeat('0')).take(6).collect();
            padded
                .parse::<u32>()
                .map_err(|e| Error::adaptation("timestamp", format!("invalid fraction: {e}")))?
        }
        Some(digits) => {
            return Err(Error::adaptation(
                "timestamp",
                format!("invalid fraction {digits:?} in {text:?}"),
            ))
        }
        None => 0,
    };

    let time = NaiveTime::from_hms_micro_opt(hms[0], hms[1], hms[2], micros)
        .ok_or_else(|| Error::adaptation("timestamp", format!("time out of range: {text:?}")))?;
    Ok(date.and_time(time))
}

fn local_from_ticks(ticks: f64) -> Option<NaiveDateTime> {
    if !ticks.is_finite() {
        return None;
    }
    let secs = ticks.floor();
    let nanos = ((ticks - secs) * 1e9).round().min(999_999_999.0) as u32;
    Local
        .timestamp_opt(secs as i64, nanos)
        .single()
        .map(|dt| dt.naive_local())
}

/// Local calendar date for a Unix timestamp.
pub fn date_from_ticks(ticks: f64) -> Option<NaiveDate> {
    local_from_ticks(ticks).map(|dt| dt.date())
}

/// Local wall-clock time (whole seconds) for a Unix timestamp.
pub fn time_from_ticks(ticks: f64) -> Option<NaiveTime> {
    local_from_ticks(ticks).and_then(|dt| dt.time().with_nanosecond(0))
}

/// Local date and time (whole seconds) for a Unix timestamp.
pub fn timestamp_from_ticks(ticks: f64) -> Option<NaiveDateTime> {
    local_from_ticks(ticks).and_then(|dt| dt.with_nanosecond(0))
}
