//! Archive, analysis and import report models.
//!
//! An archive is the portable JSON form of one user's full dataset:
//! `{ meta: {...}, data: { <collection>: [...], materialChats: { <parent>: [...] } } }`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::{AppError, Result};
use super::value::iso_string;

/// Archive format version written by this tool.
pub const ARCHIVE_VERSION: u32 = 1;

/// Archive header. Informational only; malformed fields fall back to
/// defaults instead of rejecting the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMeta {
    /// Format version.
    #[serde(default, deserialize_with = "lenient")]
    pub version: u32,
    /// ISO-8601 creation time.
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: String,
    /// Account the dataset was exported from.
    #[serde(default, deserialize_with = "lenient")]
    pub owner_id: String,
}

impl Default for ArchiveMeta {
    fn default() -> Self {
        Self {
            version: ARCHIVE_VERSION,
            timestamp: String::new(),
            owner_id: String::new(),
        }
    }
}

/// Portable snapshot of a user's dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    /// Header.
    #[serde(default, deserialize_with = "lenient")]
    pub meta: ArchiveMeta,
    /// Collection name to document list, plus nested per-parent maps.
    pub data: Map<String, Value>,
}

/// Deserialize `T`, or its default when the value has the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl Archive {
    /// Create an empty archive stamped with the current time.
    #[must_use]
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            meta: ArchiveMeta {
                version: ARCHIVE_VERSION,
                timestamp: iso_string(&Utc::now()),
                owner_id: owner_id.into(),
            },
            data: Map::new(),
        }
    }

    /// Build an archive from an already parsed JSON value.
    ///
    /// # Errors
    /// Returns error if the value has no `data` object.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| AppError::InvalidData {
            message: format!("Not a study-vault archive: {e}"),
        })
    }

    /// Documents of a top-level collection, if present as a list.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Vec<Value>> {
        self.data.get(name).and_then(Value::as_array)
    }

    /// Nested per-parent document lists stored under `key`.
    #[must_use]
    pub fn nested(&self, key: &str) -> Option<&Map<String, Value>> {
        self.data.get(key).and_then(Value::as_object)
    }

    /// Store a top-level collection.
    pub fn insert_collection(&mut self, name: &str, documents: Vec<Value>) {
        self.data.insert(name.to_string(), Value::Array(documents));
    }

    /// Store one parent's nested list under `key`.
    pub fn insert_nested(&mut self, key: &str, parent_id: &str, documents: Vec<Value>) {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(parents) = entry {
            parents.insert(parent_id.to_string(), Value::Array(documents));
        }
    }

    /// Total number of documents, nested lists included.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.data
            .values()
            .map(|value| match value {
                Value::Array(items) => items.len(),
                Value::Object(parents) => parents
                    .values()
                    .filter_map(Value::as_array)
                    .map(Vec::len)
                    .sum(),
                _ => 0,
            })
            .sum()
    }

    /// Conventional file name, dated by the archive's timestamp.
    #[must_use]
    pub fn file_name(&self) -> String {
        let date = DateTime::parse_from_rfc3339(&self.meta.timestamp)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
        format!("study-vault-backup-{}.json", date.format("%Y-%m-%d"))
    }
}

/// Read-only preview of a candidate archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupAnalysis {
    /// Whether the archive has a usable data container.
    pub valid: bool,
    /// Item count per collection.
    pub counts: BTreeMap<String, usize>,
    /// Heuristic findings for the user.
    pub warnings: Vec<String>,
    /// Sum of all counts.
    pub total_items: usize,
}

/// Outcome of an import call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// False when a batch commit failed and the restore stopped early.
    pub success: bool,
    /// Running textual log, in processing order.
    pub logs: Vec<String>,
    /// Documents durably written.
    pub documents_written: usize,
    /// Documents skipped (oversized or malformed).
    pub documents_skipped: usize,
    /// Batches committed.
    pub batches_committed: usize,
}
