//! Reset service: destructive clear of a user's dataset.
//!
//! Every registry collection, its nested families and the singleton
//! collections are emptied with delete-only commits bounded by the deletion
//! ceiling. Any failure propagates; there is no partial success.

use serde::Serialize;

use crate::domain::registry::Subcollection;
use crate::domain::{Ceilings, Result, REGISTRY, SINGLETON_COLLECTIONS};
use crate::infrastructure::{CacheInvalidator, CollectionPath, DocumentStore, WriteOp};

/// Outcome of a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResult {
    pub documents_deleted: usize,
    pub batches_committed: usize,
    pub collections_cleared: usize,
    pub cache_entries_removed: usize,
}

/// Service that deletes a user's collections.
pub struct ResetService<'a, S: ?Sized> {
    store: &'a S,
    owner_id: String,
    ceilings: Ceilings,
}

impl<'a, S: DocumentStore + ?Sized> ResetService<'a, S> {
    pub fn new(store: &'a S, owner_id: impl Into<String>, ceilings: Ceilings) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
            ceilings,
        }
    }

    /// Delete everything, then invalidate the local cache.
    ///
    /// # Errors
    /// Returns the first store or cache error encountered.
    pub async fn reset(&self, cache: &mut dyn CacheInvalidator) -> Result<ResetResult> {
        tracing::info!(owner = %self.owner_id, "Starting reset");
        let mut result = ResetResult::default();

        for spec in REGISTRY {
            let path = CollectionPath::for_owner(&self.owner_id, spec.name);
            if let Some(sub) = spec.subcollection {
                self.clear_nested(&path, sub, &mut result).await?;
            }
            self.clear_collection(&path, &mut result).await?;
        }

        for name in SINGLETON_COLLECTIONS {
            let path = CollectionPath::for_owner(&self.owner_id, name);
            self.clear_collection(&path, &mut result).await?;
        }

        result.cache_entries_removed = cache.invalidate()?;

        tracing::info!(
            deleted = result.documents_deleted,
            batches = result.batches_committed,
            collections = result.collections_cleared,
            "Reset completed"
        );

        Ok(result)
    }

    /// Clear every `sub` collection under `parent`, orphans included.
    async fn clear_nested(
        &self,
        parent: &CollectionPath,
        sub: Subcollection,
        result: &mut ResetResult,
    ) -> Result<()> {
        for nested in self.store.list_subcollections(parent, sub.name).await? {
            self.clear_collection(&nested, result).await?;
        }
        Ok(())
    }

    /// Delete every document of one collection, page by page.
    async fn clear_collection(
        &self,
        collection: &CollectionPath,
        result: &mut ResetResult,
    ) -> Result<()> {
        let page = self.ceilings.max_batch_deletes;
        let mut deleted = 0;
        loop {
            let ids = self.store.list_document_ids(collection, None, page).await?;
            if ids.is_empty() {
                break;
            }

            let ops: Vec<WriteOp> = ids
                .iter()
                .map(|id| WriteOp::Delete {
                    path: collection.document(id),
                })
                .collect();
            let count = ops.len();
            self.store.commit(ops).await?;

            result.batches_committed += 1;
            result.documents_deleted += count;
            deleted += count;
            tracing::debug!(collection = %collection, documents = count, "Delete batch committed");
        }

        if deleted > 0 {
            result.collections_cleared += 1;
            tracing::info!(collection = %collection, deleted, "Collection cleared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::analyzer::analyze;
    use crate::application::exporter::ExportService;
    use crate::application::importer::RestoreService;
    use crate::domain::{AppError, Archive, StoreFields, StoreValue};
    use crate::infrastructure::MemoryDocumentStore;
    use serde_json::json;

    #[derive(Default)]
    struct TestCache {
        invalidations: usize,
        fail: bool,
    }

    impl CacheInvalidator for TestCache {
        fn invalidate(&mut self) -> Result<usize> {
            self.invalidations += 1;
            if self.fail {
                return Err(AppError::Cache {
                    message: "locked".into(),
                    source: None,
                });
            }
            Ok(0)
        }
    }

    async fn seed(store: &MemoryDocumentStore, collection: &CollectionPath, count: usize) {
        let mut fields = StoreFields::new();
        fields.insert("title".into(), StoreValue::String("x".into()));
        for i in 0..count {
            store
                .set_document(&collection.document(&format!("d{i:05}")), &fields)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_reset_then_export_is_empty() {
        let store = MemoryDocumentStore::new();
        let materials = CollectionPath::for_owner("u1", "materials");
        seed(&store, &materials, 3).await;
        seed(&store, &materials.subcollection("d00000", "chats"), 4).await;
        seed(&store, &CollectionPath::for_owner("u1", "tasks"), 10).await;
        seed(&store, &CollectionPath::for_owner("u1", "mentorMemory"), 1).await;
        let mut cache = TestCache::default();

        let result = ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await
            .unwrap();

        assert_eq!(result.documents_deleted, 18);
        assert_eq!(result.collections_cleared, 4);
        assert_eq!(cache.invalidations, 1);

        let archive = ExportService::new(&store, "u1").export(None).await;
        let analysis = analyze(&serde_json::to_value(&archive).unwrap());
        assert_eq!(analysis.total_items, 0);
        assert_eq!(store.len(&CollectionPath::for_owner("u1", "mentorMemory")), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_chats_of_skipped_material() {
        let store = MemoryDocumentStore::new();
        let mut archive = Archive::new("u1");
        archive.insert_collection(
            "materials",
            vec![json!({"id": "big", "body": "x".repeat(1_200_000)})],
        );
        archive.insert_nested(
            "materialChats",
            "big",
            vec![json!({"id": "c1"}), json!({"id": "c2"})],
        );
        let mut cache = TestCache::default();

        let report = RestoreService::new(&store, "u1", Ceilings::default())
            .import_archive(&archive, &mut cache, None)
            .await;
        assert!(report.success);
        let materials = CollectionPath::for_owner("u1", "materials");
        let chats = materials.subcollection("big", "chats");
        assert_eq!(store.len(&materials), 0);
        assert_eq!(store.len(&chats), 2);

        let result = ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await
            .unwrap();

        assert_eq!(store.len(&chats), 0);
        assert_eq!(result.documents_deleted, 2);
    }

    #[tokio::test]
    async fn test_delete_batches_respect_ceiling() {
        let store = MemoryDocumentStore::new();
        seed(&store, &CollectionPath::for_owner("u1", "notes"), 950).await;
        let mut cache = TestCache::default();

        let result = ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await
            .unwrap();

        let sizes: Vec<usize> = store.committed_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![400, 400, 150]);
        assert_eq!(result.batches_committed, 3);
        assert!(store
            .committed_batches()
            .iter()
            .flatten()
            .all(|op| matches!(op, WriteOp::Delete { .. })));
    }

    #[tokio::test]
    async fn test_other_owners_are_untouched() {
        let store = MemoryDocumentStore::new();
        seed(&store, &CollectionPath::for_owner("u1", "tasks"), 2).await;
        seed(&store, &CollectionPath::for_owner("u2", "tasks"), 2).await;
        let mut cache = TestCache::default();

        ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await
            .unwrap();

        assert_eq!(store.len(&CollectionPath::for_owner("u2", "tasks")), 2);
    }

    #[tokio::test]
    async fn test_commit_failure_propagates() {
        let store = MemoryDocumentStore::new().failing_commit(1);
        seed(&store, &CollectionPath::for_owner("u1", "tasks"), 2).await;
        let mut cache = TestCache::default();

        let err = ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await;

        assert!(matches!(err, Err(AppError::Store { .. })));
        assert_eq!(cache.invalidations, 0);
    }

    #[tokio::test]
    async fn test_cache_failure_propagates() {
        let store = MemoryDocumentStore::new();
        let mut cache = TestCache {
            fail: true,
            ..TestCache::default()
        };

        let err = ResetService::new(&store, "u1", Ceilings::default())
            .reset(&mut cache)
            .await;

        assert!(matches!(err, Err(AppError::Cache { .. })));
    }
}
