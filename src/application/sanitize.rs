//! Sanitizers for crossing the store/portable boundary.
//!
//! Export turns store-native values into plain JSON: native timestamps
//! become ISO-8601 strings and absent entries are dropped. Import repairs
//! timestamps that an earlier serialization flattened into
//! `{seconds, nanoseconds}` objects.
//!
//! Both passes stop descending at [`MAX_DEPTH`]; deeper subtrees become
//! `null`.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::domain::value::iso_string;
use crate::domain::{StoreFields, StoreValue};

/// Deepest nesting either pass descends into.
pub const MAX_DEPTH: usize = 128;

/// Serialized timestamps carry at most this many entries.
const TIMESTAMP_MAX_ENTRIES: usize = 4;

const SECONDS_KEYS: [&str; 2] = ["seconds", "_seconds"];
const NANOS_KEYS: [&str; 2] = ["nanoseconds", "_nanoseconds"];

/// Latest instant a timestamp may denote, in milliseconds.
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// Convert a store value into its portable form.
#[cfg(test)]
#[must_use]
pub fn sanitize_for_export(value: &StoreValue) -> Value {
    export_value(value, 0).unwrap_or(Value::Null)
}

/// Convert a document body into its portable form.
#[must_use]
pub fn sanitize_document_for_export(fields: &StoreFields) -> Map<String, Value> {
    export_fields(fields, 0)
}

fn export_value(value: &StoreValue, depth: usize) -> Option<Value> {
    if depth > MAX_DEPTH {
        tracing::warn!(depth, "Value nested too deeply, exporting null");
        return Some(Value::Null);
    }

    match value {
        StoreValue::Absent => None,
        StoreValue::Null => Some(Value::Null),
        StoreValue::Bool(b) => Some(Value::Bool(*b)),
        StoreValue::Number(n) => Some(Value::Number(n.clone())),
        StoreValue::String(s) => Some(Value::String(s.clone())),
        StoreValue::Timestamp(ts) => Some(Value::String(iso_string(ts))),
        StoreValue::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| export_value(item, depth + 1).unwrap_or(Value::Null))
                .collect(),
        )),
        StoreValue::Map(fields) => Some(Value::Object(export_fields(fields, depth + 1))),
    }
}

fn export_fields(fields: &StoreFields, depth: usize) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(key, value)| export_value(value, depth).map(|v| (key.clone(), v)))
        .collect()
}

/// Repair a portable value for writing back into the store.
#[cfg(test)]
#[must_use]
pub fn sanitize_for_import(value: &Value) -> Value {
    import_value(value, 0)
}

/// Repair a document body field by field.
///
/// The document itself is never treated as a timestamp, only its entries.
#[must_use]
pub fn sanitize_document_for_import(document: &Map<String, Value>) -> Map<String, Value> {
    import_entries(document, 0)
}

fn import_value(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        tracing::warn!(depth, "Value nested too deeply, importing null");
        return Value::Null;
    }

    match value {
        Value::Object(map) if looks_like_timestamp(map) => {
            timestamp_from_parts(map).map_or_else(|| value.clone(), Value::String)
        }
        Value::Object(map) => Value::Object(import_entries(map, depth + 1)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| import_value(item, depth + 1))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

fn import_entries(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), import_value(value, depth)))
        .collect()
}

fn first_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| map.get(*key))
        .and_then(Value::as_f64)
}

/// Numeric seconds and nanoseconds fields and no more than four entries.
fn looks_like_timestamp(map: &Map<String, Value>) -> bool {
    map.len() <= TIMESTAMP_MAX_ENTRIES
        && first_number(map, &SECONDS_KEYS).is_some()
        && first_number(map, &NANOS_KEYS).is_some()
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp_from_parts(map: &Map<String, Value>) -> Option<String> {
    let seconds = first_number(map, &SECONDS_KEYS)?;
    let nanos = first_number(map, &NANOS_KEYS)?;

    let millis = seconds.mul_add(1000.0, nanos / 1e6);
    if !millis.is_finite() || millis.abs() > MAX_EPOCH_MILLIS {
        return None;
    }

    DateTime::from_timestamp_millis(millis.trunc() as i64).map(|ts| iso_string(&ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_export_timestamp_becomes_iso() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(
            sanitize_for_export(&StoreValue::Timestamp(ts)),
            json!("2023-11-14T22:13:20.000Z")
        );
    }

    #[test]
    fn test_export_drops_absent_entries_but_keeps_null() {
        let mut inner = StoreFields::new();
        inner.insert("missing".into(), StoreValue::Absent);
        inner.insert("empty".into(), StoreValue::Null);

        let mut fields = StoreFields::new();
        fields.insert("inner".into(), StoreValue::Map(inner));
        fields.insert("gone".into(), StoreValue::Absent);
        fields.insert(
            "tags".into(),
            StoreValue::Array(vec![StoreValue::String("bio".into()), StoreValue::Absent]),
        );

        let exported = Value::Object(sanitize_document_for_export(&fields));
        assert_eq!(exported, json!({"inner": {"empty": null}, "tags": ["bio", null]}));
        assert_eq!(sanitize_for_export(&StoreValue::Absent), Value::Null);
    }

    #[test]
    fn test_import_repairs_both_spellings() {
        let plain = json!({"seconds": 1_700_000_000, "nanoseconds": 0});
        let underscored = json!({"_seconds": 1_700_000_000, "_nanoseconds": 500_000_000});

        assert_eq!(sanitize_for_import(&plain), json!("2023-11-14T22:13:20.000Z"));
        assert_eq!(
            sanitize_for_import(&underscored),
            json!("2023-11-14T22:13:20.500Z")
        );
    }

    #[test]
    fn test_import_is_idempotent_on_timestamps() {
        let once = sanitize_for_import(&json!({"seconds": 1_700_000_000, "nanoseconds": 0}));
        let twice = sanitize_for_import(&once);
        assert_eq!(once, twice);
        assert_eq!(twice, json!("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn test_import_leaves_larger_records_alone() {
        let record = json!({
            "seconds": 10, "nanoseconds": 0, "lap": 1, "runner": "a", "split": 2
        });
        assert_eq!(sanitize_for_import(&record), record);
    }

    #[test]
    fn test_import_requires_numeric_parts() {
        let record = json!({"seconds": "10", "nanoseconds": 0});
        assert_eq!(sanitize_for_import(&record), record);
    }

    #[test]
    fn test_import_out_of_range_is_returned_unchanged() {
        let record = json!({"seconds": 1e300, "nanoseconds": 0});
        assert_eq!(sanitize_for_import(&record), record);
    }

    #[test]
    fn test_import_recurses_into_nested_values() {
        let doc = json!({
            "id": "s1",
            "schedule": [{"at": {"seconds": 0, "nanoseconds": 0}, "label": "start"}]
        });
        let repaired = sanitize_document_for_import(doc.as_object().unwrap());
        assert_eq!(repaired["schedule"][0]["at"], "1970-01-01T00:00:00.000Z");
        assert_eq!(repaired["schedule"][0]["label"], "start");
    }

    #[test]
    fn test_document_itself_is_never_a_timestamp() {
        let doc = json!({"id": "lap-1", "seconds": 61, "nanoseconds": 5});
        let repaired = sanitize_document_for_import(doc.as_object().unwrap());
        assert_eq!(Value::Object(repaired), doc);
    }

    #[test]
    fn test_portable_values_round_trip() {
        let samples = [
            json!(null),
            json!(42),
            json!(-1.5),
            json!("text"),
            json!([1, "two", null, {"three": [3]}]),
            json!({"id": "k1", "nested": {"deep": {"flag": true}}, "empty": {}}),
            json!({"seconds": 5}),
            json!(u64::MAX),
        ];

        for x in samples {
            let back = sanitize_for_export(&StoreValue::from(sanitize_for_import(&x)));
            assert_eq!(back, x);
        }
    }

    #[test]
    fn test_depth_limit_cuts_off_deep_values() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_DEPTH + 10) {
            value = json!([value]);
        }

        let mut cursor = &sanitize_for_import(&value);
        let mut depth = 0;
        while let Value::Array(items) = cursor {
            cursor = &items[0];
            depth += 1;
        }
        assert_eq!(cursor, &Value::Null);
        assert_eq!(depth, MAX_DEPTH + 1);
    }
}
