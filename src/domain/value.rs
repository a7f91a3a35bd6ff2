//! Store-native value model.
//!
//! The document store hands back values that are richer than JSON: native
//! timestamps and "absent" entries that have no portable representation.
//! Stored JSON tags both (`{"$timestamp": ...}`, `{"$absent": true}`).
//! Portable values are plain `serde_json::Value`.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use super::error::{AppError, Result};

/// Key used to persist native timestamps inside stored JSON.
const TIMESTAMP_TAG: &str = "$timestamp";

/// Key marking an entry that exists without a value.
const ABSENT_TAG: &str = "$absent";

/// Fields of a stored document, keyed by field name.
pub type StoreFields = BTreeMap<String, StoreValue>;

/// A value as the document store represents it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    /// An entry that exists but holds no value (undefined).
    Absent,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Native store timestamp.
    Timestamp(DateTime<Utc>),
    Array(Vec<StoreValue>),
    Map(StoreFields),
}

impl StoreValue {
    /// Decode a value persisted with `$timestamp` or `$absent` tags.
    #[must_use]
    pub fn from_stored_json(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if let Some(ts) = tagged_timestamp(&map) {
                    return Self::Timestamp(ts);
                }
                if is_absent_tag(&map) {
                    return Self::Absent;
                }
                Self::Map(
                    map.into_iter()
                        .map(|(k, v)| (k, Self::from_stored_json(v)))
                        .collect(),
                )
            }
            Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_stored_json).collect())
            }
            other => Self::from(other),
        }
    }

    /// Encode for persistence, tagging timestamps and absent entries.
    #[cfg(test)]
    #[must_use]
    pub fn to_stored_json(&self) -> Value {
        let tagged = |key: &str, value: Value| {
            let mut map = Map::new();
            map.insert(key.to_string(), value);
            Value::Object(map)
        };
        match self {
            Self::Absent => tagged(ABSENT_TAG, Value::Bool(true)),
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => tagged(
                TIMESTAMP_TAG,
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            ),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_stored_json).collect()),
            Self::Map(fields) => Value::Object(fields_to_stored_json(fields)),
        }
    }
}

/// Portable values carry no timestamps or absent entries.
impl From<Value> for StoreValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<DateTime<Utc>> for StoreValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

fn tagged_timestamp(map: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if map.len() != 1 {
        return None;
    }
    let raw = map.get(TIMESTAMP_TAG)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_absent_tag(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.get(ABSENT_TAG) == Some(&Value::Bool(true))
}

/// Encode document fields for persistence.
#[cfg(test)]
#[must_use]
pub fn fields_to_stored_json(fields: &StoreFields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_stored_json()))
        .collect()
}

/// Decode a persisted document body into store fields.
#[must_use]
pub fn fields_from_stored_json(map: Map<String, Value>) -> StoreFields {
    map.into_iter()
        .map(|(k, v)| (k, StoreValue::from_stored_json(v)))
        .collect()
}

/// ISO-8601 rendering used throughout archives (`2023-11-14T22:13:20.000Z`).
#[must_use]
pub fn iso_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Byte length of a value once serialized as compact JSON.
///
/// # Errors
/// Returns error if the value cannot be serialized.
pub fn serialized_size<T: serde::Serialize + ?Sized>(value: &T) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(AppError::json_parse)
}

/// A document read from the store together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDocument {
    /// Store key of the document.
    pub id: String,
    /// Document body.
    pub fields: StoreFields,
}
