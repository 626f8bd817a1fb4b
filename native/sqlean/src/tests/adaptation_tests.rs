//! Tests for adaptation.rs - Adapters, protocols and converters
//!
//! Registry-level tests use private registries so they never race with other
//! tests over the process-wide one. The single test touching the global
//! registry registers a type no other test uses.

// Allow unwrap() in tests for cleaner test code
#![allow(clippy::unwrap_used)]

use super::test_utils::test_options;
use crate::adaptation::{
    self, convert_date, convert_timestamp, date_from_ticks, time_from_ticks,
    timestamp_from_ticks, AdaptationRegistry,
};
use crate::{params, Connection, DetectTypes, Error, ErrorKind, Value};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

fn point_registry() -> AdaptationRegistry {
    let mut registry = AdaptationRegistry::with_defaults();
    registry.register_adapter::<Point, _>(|p| Ok(Value::Text(format!("{};{}", p.x, p.y))));
    registry.register_converter("point", |raw| {
        let text = std::str::from_utf8(raw).map_err(|e| Error::adaptation("point", e.to_string()))?;
        let (x, y) = text
            .split_once(';')
            .ok_or_else(|| Error::adaptation("point", format!("bad point {text:?}")))?;
        let x = x.parse().map_err(|_| Error::adaptation("point", "bad x"))?;
        let y = y.parse().map_err(|_| Error::adaptation("point", "bad y"))?;
        Ok(Value::custom(Point { x, y }))
    });
    registry
}

// ============================================================================
// ADAPT
// ============================================================================

#[test]
fn test_native_values_pass_through() {
    let registry = AdaptationRegistry::new();
    for value in [
        Value::Null,
        Value::Integer(7),
        Value::Real(1.5),
        Value::Text("hi".into()),
        Value::Blob(vec![1, 2, 3]),
        Value::from(true),
    ] {
        assert_eq!(registry.adapt(&value).unwrap(), value);
    }
}

#[test]
fn test_unregistered_custom_value_is_adaptation_error() {
    let registry = AdaptationRegistry::new();
    let err = registry.adapt(&Value::custom(Point { x: 1.0, y: 2.0 })).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Adaptation);
    assert!(err.to_string().contains("Point"), "error should name the type: {err}");
}

#[test]
fn test_exact_type_adapter_is_used() {
    let registry = point_registry();
    let adapted = registry.adapt(&Value::custom(Point { x: 1.0, y: 2.5 })).unwrap();
    assert_eq!(adapted, Value::Text("1;2.5".into()));
}

#[test]
fn test_last_registration_wins() {
    let mut registry = AdaptationRegistry::new();
    registry.register_adapter::<Point, _>(|_| Ok(Value::Integer(1)));
    registry.register_adapter::<Point, _>(|_| Ok(Value::Integer(2)));
    let adapted = registry.adapt(&Value::custom(Point { x: 0.0, y: 0.0 })).unwrap();
    assert_eq!(adapted, Value::Integer(2));
}

#[test]
fn test_adapter_for_native_type_overrides_pass_through() {
    let mut registry = AdaptationRegistry::new();
    registry.register_adapter::<String, _>(|s| Ok(Value::Text(s.to_uppercase())));
    assert_eq!(
        registry.adapt(&Value::Text("abc".into())).unwrap(),
        Value::Text("ABC".into())
    );
    // Other natives are untouched.
    assert_eq!(registry.adapt(&Value::Integer(3)).unwrap(), Value::Integer(3));
}

#[test]
fn test_adapter_must_produce_native_value() {
    let mut registry = AdaptationRegistry::new();
    registry.register_adapter::<Point, _>(|p| Ok(Value::custom(p.clone())));
    let err = registry.adapt(&Value::custom(Point { x: 0.0, y: 0.0 })).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Adaptation);
}

#[test]
fn test_protocols_tried_in_registration_order() {
    let mut registry = AdaptationRegistry::new();
    registry.register_protocol("first", |any| {
        any.downcast_ref::<Point>().map(|_| Ok(Value::Integer(1)))
    });
    registry.register_protocol("second", |any| {
        any.downcast_ref::<Point>().map(|_| Ok(Value::Integer(2)))
    });
    let adapted = registry.adapt(&Value::custom(Point { x: 0.0, y: 0.0 })).unwrap();
    assert_eq!(adapted, Value::Integer(1));

    // Re-registering keeps the protocol's position.
    registry.register_protocol("first", |any| {
        any.downcast_ref::<Point>().map(|_| Ok(Value::Integer(10)))
    });
    let adapted = registry.adapt(&Value::custom(Point { x: 0.0, y: 0.0 })).unwrap();
    assert_eq!(adapted, Value::Integer(10));
}

#[test]
fn test_exact_adapter_beats_protocol() {
    let mut registry = AdaptationRegistry::new();
    registry.register_protocol("any-point", |any| {
        any.downcast_ref::<Point>().map(|_| Ok(Value::Integer(1)))
    });
    registry.register_adapter::<Point, _>(|_| Ok(Value::Integer(2)));
    let adapted = registry.adapt(&Value::custom(Point { x: 0.0, y: 0.0 })).unwrap();
    assert_eq!(adapted, Value::Integer(2));
}

#[test]
fn test_default_date_and_timestamp_adapters() {
    let registry = AdaptationRegistry::with_defaults();
    let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    assert_eq!(
        registry.adapt(&Value::from(date)).unwrap(),
        Value::Text("2020-01-02".into())
    );

    let ts = date.and_hms_opt(3, 4, 5).unwrap();
    assert_eq!(
        registry.adapt(&Value::from(ts)).unwrap(),
        Value::Text("2020-01-02 03:04:05".into())
    );

    let ts = date.and_hms_micro_opt(3, 4, 5, 120).unwrap();
    assert_eq!(
        registry.adapt(&Value::from(ts)).unwrap(),
        Value::Text("2020-01-02 03:04:05.000120".into())
    );
}

// ============================================================================
// CONVERT
// ============================================================================

#[test]
fn test_convert_without_converter_returns_raw_bytes() {
    let registry = AdaptationRegistry::new();
    assert_eq!(
        registry.convert("whatever", b"abc").unwrap(),
        Value::Blob(b"abc".to_vec())
    );
}

#[test]
fn test_converter_lookup_is_case_insensitive_and_strips_suffix() {
    let registry = point_registry();
    assert!(registry.converter("POINT").is_some());
    assert!(registry.converter("Point(2)").is_some());
    let value = registry.convert("POINT", b"3;4").unwrap();
    assert_eq!(value.downcast_ref::<Point>(), Some(&Point { x: 3.0, y: 4.0 }));
}

#[test]
fn test_unregister() {
    let mut registry = point_registry();
    assert!(registry.has_adapter::<Point>());
    assert!(registry.unregister_adapter::<Point>());
    assert!(!registry.has_adapter::<Point>());
    assert!(registry.unregister_converter("point"));
    assert!(!registry.unregister_converter("point"));
}

#[test]
fn test_convert_timestamp_fraction_is_padded_and_truncated() {
    let ts = convert_timestamp(b"2020-01-02 03:04:05.5").unwrap();
    assert_eq!(ts.nanosecond(), 500_000_000);

    let ts = convert_timestamp(b"2020-01-02 03:04:05.1234567").unwrap();
    assert_eq!(ts.nanosecond(), 123_456_000);

    let ts = convert_timestamp(b"2020-01-02T03:04:05").unwrap();
    assert_eq!(ts, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap());
}

#[test]
fn test_convert_rejects_malformed_input() {
    assert!(convert_date(b"2020-13-01").is_err());
    assert!(convert_date(b"yesterday").is_err());
    assert!(convert_timestamp(b"2020-01-02").is_err());
    assert!(convert_timestamp(b"2020-01-02 25:00:00").is_err());
    assert!(convert_timestamp(b"2020-01-02 03:04:05.x").is_err());
}

#[test]
fn test_ticks_helpers() {
    let date = date_from_ticks(0.0).unwrap();
    let ts = timestamp_from_ticks(0.0).unwrap();
    assert_eq!(ts.date(), date);
    assert_eq!(time_from_ticks(0.0).unwrap(), ts.time());
    assert_eq!(ts.nanosecond(), 0);
    assert!(date_from_ticks(f64::NAN).is_none());
}

// ============================================================================
// ROUND TRIP THROUGH THE ENGINE
// ============================================================================

#[test]
fn test_custom_type_round_trip_with_private_registry() {
    let registry = Arc::new(RwLock::new(point_registry()));
    let conn = Connection::open(":memory:", test_options().registry(registry)).unwrap();

    conn.execute("CREATE TABLE shapes (id INTEGER, p POINT)", ()).unwrap();
    let original = Point { x: -1.25, y: 8.0 };
    conn.execute(
        "INSERT INTO shapes VALUES (?, ?)",
        params![1, Value::custom(original.clone())],
    )
    .unwrap();

    let row = conn
        .execute("SELECT p FROM shapes WHERE id = 1", ())
        .unwrap()
        .fetch_one()
        .unwrap()
        .unwrap();
    assert_eq!(row[0].downcast_ref::<Point>(), Some(&original));
}

#[test]
fn test_colnames_detection_selects_converter() {
    let registry = Arc::new(RwLock::new(point_registry()));
    let options = test_options().registry(registry).detect_types(DetectTypes {
        decltypes: false,
        colnames: true,
    });
    let conn = Connection::open(":memory:", options).unwrap();

    let mut cursor = conn.execute("SELECT '5;6' AS \"p [point]\"", ()).unwrap();
    let description = cursor.description().unwrap();
    assert_eq!(description[0].name, "p");

    let row = cursor.fetch_one().unwrap().unwrap();
    assert_eq!(row["p"].downcast_ref::<Point>(), Some(&Point { x: 5.0, y: 6.0 }));
}

#[test]
fn test_detection_disabled_returns_native_values() {
    let options = test_options().detect_types(DetectTypes::NONE);
    let conn = Connection::open(":memory:", options).unwrap();
    conn.execute("CREATE TABLE t (d DATE)", ()).unwrap();
    conn.execute("INSERT INTO t VALUES ('2020-01-02')", ()).unwrap();

    let row = conn.execute("SELECT d FROM t", ()).unwrap().fetch_one().unwrap().unwrap();
    assert_eq!(row[0], Value::Text("2020-01-02".into()));
}

#[test]
fn test_converter_failure_names_the_column() {
    let conn = Connection::open(":memory:", test_options()).unwrap();
    conn.execute("CREATE TABLE t (d DATE)", ()).unwrap();
    conn.execute("INSERT INTO t VALUES ('not a date')", ()).unwrap();

    let err = conn
        .execute("SELECT d FROM t", ())
        .unwrap()
        .fetch_one()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Adaptation);
    assert!(err.to_string().contains("\"d\""), "error should name the column: {err}");
}

#[test]
fn test_null_is_never_converted() {
    let conn = Connection::open(":memory:", test_options()).unwrap();
    conn.execute("CREATE TABLE t (d DATE)", ()).unwrap();
    conn.execute("INSERT INTO t VALUES (NULL)", ()).unwrap();

    let row = conn.execute("SELECT d FROM t", ()).unwrap().fetch_one().unwrap().unwrap();
    assert!(row[0].is_null());
}

#[test]
fn test_global_registry_registration_and_reset() {
    #[derive(Debug, PartialEq)]
    struct Celsius(f64);

    adaptation::register_adapter::<Celsius, _>(|c| Ok(Value::Real(c.0))).unwrap();
    adaptation::register_converter("celsius", |raw| {
        let text = std::str::from_utf8(raw).map_err(|e| Error::adaptation("celsius", e.to_string()))?;
        text.parse::<f64>()
            .map(|v| Value::custom(Celsius(v)))
            .map_err(|e| Error::adaptation("celsius", e.to_string()))
    })
    .unwrap();

    let conn = Connection::open(":memory:", test_options()).unwrap();
    conn.execute("CREATE TABLE temps (t CELSIUS)", ()).unwrap();
    conn.execute("INSERT INTO temps VALUES (?)", params![Value::custom(Celsius(21.5))])
        .unwrap();
    let row = conn.execute("SELECT t FROM temps", ()).unwrap().fetch_one().unwrap().unwrap();
    assert_eq!(row[0].downcast_ref::<Celsius>(), Some(&Celsius(21.5)));

    adaptation::reset().unwrap();
    let global = adaptation::global();
    let registry = global.read().unwrap();
    assert!(!registry.has_adapter::<Celsius>());
    assert!(registry.converter("celsius").is_none());
    assert!(registry.has_adapter::<NaiveDate>());
    assert!(registry.has_adapter::<NaiveDateTime>());
    assert!(registry.converter("date").is_some());
}
