//! Export service: snapshot a user's dataset into a portable archive.
//!
//! Collections are read one after another in registry order. A failed read
//! is logged and the collection left out; the rest of the archive is still
//! produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::registry;
use crate::domain::{AppError, Archive, Result, StoreDocument, REGISTRY, SINGLETON_COLLECTIONS};
use crate::infrastructure::{CollectionPath, DocumentStore};

use super::progress::ProgressReporter;
use super::sanitize::sanitize_document_for_export;

/// Service that reads the store into archives.
pub struct ExportService<'a, S: ?Sized> {
    store: &'a S,
    owner_id: String,
}

impl<'a, S: DocumentStore + ?Sized> ExportService<'a, S> {
    /// Create an export service for `owner_id`'s collections.
    pub fn new(store: &'a S, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
        }
    }

    /// Read every registry collection and nested chat list into an archive.
    pub async fn export(&self, progress: Option<&dyn ProgressReporter>) -> Archive {
        let mut archive = Archive::new(self.owner_id.clone());
        let total = REGISTRY.len();

        for (index, spec) in REGISTRY.iter().enumerate() {
            if let Some(progress) = progress {
                progress.on_progress(index, total, &format!("Exporting {}...", spec.name));
            }

            let path = CollectionPath::for_owner(&self.owner_id, spec.name);
            let documents = match self.store.list_documents(&path).await {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!(
                        collection = spec.name,
                        error = %e,
                        "Skipping unreadable collection"
                    );
                    continue;
                }
            };
            tracing::info!(collection = spec.name, count = documents.len(), "Collection exported");

            if let Some(sub) = spec.subcollection {
                for parent in &documents {
                    let nested_path = path.subcollection(&parent.id, sub.name);
                    match self.store.list_documents(&nested_path).await {
                        Ok(children) if children.is_empty() => {}
                        Ok(children) => archive.insert_nested(
                            sub.archive_key,
                            &parent.id,
                            children.iter().map(portable_document).collect(),
                        ),
                        Err(e) => {
                            tracing::warn!(
                                collection = %nested_path,
                                error = %e,
                                "Skipping unreadable subcollection"
                            );
                        }
                    }
                }
            }

            archive.insert_collection(
                spec.name,
                documents.iter().map(portable_document).collect(),
            );
        }

        if let Some(progress) = progress {
            progress.on_progress(total, total, "Export complete");
        }
        tracing::info!(documents = archive.document_count(), "Export finished");

        archive
    }

    /// Count stored documents per collection, nested families included.
    ///
    /// # Errors
    /// Returns error if any collection cannot be read.
    pub async fn inventory(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();

        for spec in REGISTRY {
            let path = CollectionPath::for_owner(&self.owner_id, spec.name);
            counts.insert(spec.name.to_string(), self.store.count_documents(&path).await?);
        }

        for (parent, sub) in registry::nested_families() {
            let parent_path = CollectionPath::for_owner(&self.owner_id, parent.name);
            let mut nested = 0;
            for path in self.store.list_subcollections(&parent_path, sub.name).await? {
                nested += self.store.count_documents(&path).await?;
            }
            counts.insert(sub.archive_key.to_string(), nested);
        }

        for name in SINGLETON_COLLECTIONS {
            let path = CollectionPath::for_owner(&self.owner_id, name);
            counts.insert((*name).to_string(), self.store.count_documents(&path).await?);
        }

        Ok(counts)
    }
}

/// Sanitized document body with `id` set to its store key.
fn portable_document(document: &StoreDocument) -> Value {
    let mut body = sanitize_document_for_export(&document.fields);
    body.insert("id".to_string(), Value::String(document.id.clone()));
    Value::Object(body)
}

/// Write `archive` as pretty JSON into `dir` under its dated file name.
///
/// # Errors
/// Returns error if the archive cannot be serialized or written.
pub fn write_archive(archive: &Archive, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create {}", dir.display()), e))?;

    let path = dir.join(archive.file_name());
    let json = serde_json::to_string_pretty(archive).map_err(AppError::json_parse)?;
    std::fs::write(&path, json)
        .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;

    tracing::info!(path = %path.display(), "Archive written");

    Ok(path)
}

/// Read and parse an archive file into a JSON value.
///
/// # Errors
/// Returns error if the file cannot be read or is not JSON.
pub fn read_archive_file(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
    serde_json::from_str(&raw).map_err(AppError::json_parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::analyzer::analyze;
    use crate::domain::{StoreFields, StoreValue};
    use crate::infrastructure::MemoryDocumentStore;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    async fn seed(
        store: &MemoryDocumentStore,
        collection: &CollectionPath,
        id: &str,
        fields: StoreFields,
    ) {
        store
            .set_document(&collection.document(id), &fields)
            .await
            .unwrap();
    }

    fn title(text: &str) -> StoreFields {
        let mut fields = StoreFields::new();
        fields.insert("title".into(), StoreValue::String(text.into()));
        fields
    }

    #[tokio::test]
    async fn test_export_sets_ids_and_converts_timestamps() {
        let store = MemoryDocumentStore::new();
        let tasks = CollectionPath::for_owner("u1", "tasks");
        let mut fields = title("Read chapter 3");
        fields.insert(
            "dueAt".into(),
            StoreValue::Timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        );
        fields.insert("draft".into(), StoreValue::Absent);
        seed(&store, &tasks, "t1", fields).await;

        let archive = ExportService::new(&store, "u1").export(None).await;

        let exported = &archive.collection("tasks").unwrap()[0];
        assert_eq!(exported["id"], "t1");
        assert_eq!(exported["dueAt"], "2023-11-14T22:13:20.000Z");
        assert!(exported.get("draft").is_none());
        assert_eq!(archive.meta.owner_id, "u1");
        assert_eq!(archive.meta.version, 1);
    }

    #[tokio::test]
    async fn test_export_gathers_chats_per_material() {
        let store = MemoryDocumentStore::new();
        let materials = CollectionPath::for_owner("u1", "materials");
        seed(&store, &materials, "m1", title("Biology")).await;
        seed(&store, &materials, "m2", title("Chemistry")).await;
        let chats = materials.subcollection("m1", "chats");
        seed(&store, &chats, "c1", title("hi")).await;
        seed(&store, &chats, "c2", title("hello")).await;

        let archive = ExportService::new(&store, "u1").export(None).await;

        let nested = archive.nested("materialChats").unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested["m1"].as_array().unwrap().len(), 2);

        let analysis = analyze(&serde_json::to_value(&archive).unwrap());
        assert_eq!(analysis.counts.get("materialChats"), Some(&2));
        assert_eq!(analysis.total_items, 4);
    }

    #[tokio::test]
    async fn test_unreadable_collection_is_left_out() {
        let store = MemoryDocumentStore::new()
            .failing_reads(CollectionPath::for_owner("u1", "notes"));
        seed(&store, &CollectionPath::for_owner("u1", "tasks"), "t1", title("x")).await;

        let archive = ExportService::new(&store, "u1").export(None).await;

        assert!(archive.collection("notes").is_none());
        assert_eq!(archive.collection("tasks").map(Vec::len), Some(1));
        assert_eq!(archive.collection("sessions").map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_inventory_counts_everything() {
        let store = MemoryDocumentStore::new();
        let materials = CollectionPath::for_owner("u1", "materials");
        seed(&store, &materials, "m1", title("Biology")).await;
        seed(&store, &materials.subcollection("m1", "chats"), "c1", title("q")).await;
        seed(&store, &CollectionPath::for_owner("u1", "settings"), "prefs", title("p")).await;

        let counts = ExportService::new(&store, "u1").inventory().await.unwrap();

        assert_eq!(counts["materials"], 1);
        assert_eq!(counts["materialChats"], 1);
        assert_eq!(counts["settings"], 1);
        assert_eq!(counts["tasks"], 0);
    }

    #[test]
    fn test_write_and_read_archive_file() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::new("u1");
        archive.insert_collection("notes", vec![serde_json::json!({"id": "n1"})]);

        let path = write_archive(&archive, &dir.path().join("exports")).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("study-vault-backup-"));
        assert!(name.ends_with(".json"));

        let value = read_archive_file(&path).unwrap();
        assert_eq!(value["data"]["notes"][0]["id"], "n1");
        assert_eq!(value["meta"]["ownerId"], "u1");
    }
}
