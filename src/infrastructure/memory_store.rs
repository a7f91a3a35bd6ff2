//! In-memory document store.
//!
//! Applies the same hard ceilings as the hosted store and records every
//! committed batch so batch shapes can be asserted. Commits and reads can be
//! made to fail on demand.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::value::{fields_from_stored_json, fields_to_stored_json};
use crate::domain::{AppError, Result, StoreDocument, StoreFields};

use super::store::{CollectionPath, DocumentPath, DocumentStore, StoreLimits, WriteOp};

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionPath, BTreeMap<String, StoreFields>>,
    committed: Vec<Vec<WriteOp>>,
    commit_attempts: usize,
    fail_on_commit: Option<usize>,
    failing_reads: HashSet<CollectionPath>,
}

/// Document store held entirely in memory.
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
    limits: StoreLimits,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            limits: StoreLimits::HARD,
        }
    }

    /// Make the `n`th commit attempt (1-based) fail.
    #[must_use]
    pub fn failing_commit(self, n: usize) -> Self {
        self.state().fail_on_commit = Some(n);
        self
    }

    /// Make reads of `collection` fail.
    #[must_use]
    pub fn failing_reads(self, collection: CollectionPath) -> Self {
        self.state().failing_reads.insert(collection);
        self
    }

    /// Every successfully committed batch, in order.
    #[must_use]
    pub fn committed_batches(&self) -> Vec<Vec<WriteOp>> {
        self.state().committed.clone()
    }

    /// Look up a stored document.
    #[must_use]
    pub fn document(&self, path: &DocumentPath) -> Option<StoreFields> {
        self.state()
            .collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .cloned()
    }

    /// Write one document directly, keeping store-native values.
    ///
    /// # Errors
    /// Returns a store error if the document exceeds the hard limit.
    pub async fn set_document(&self, path: &DocumentPath, fields: &StoreFields) -> Result<()> {
        let data = fields_to_stored_json(fields);
        self.limits.check_document(path, &data)?;
        self.state()
            .collections
            .entry(path.collection.clone())
            .or_default()
            .insert(path.id.clone(), fields.clone());
        Ok(())
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &CollectionPath) -> usize {
        self.state().collections.get(collection).map_or(0, BTreeMap::len)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_documents(&self, collection: &CollectionPath) -> Result<Vec<StoreDocument>> {
        let state = self.state();
        if state.failing_reads.contains(collection) {
            return Err(AppError::store(format!("read of {collection} failed")));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| StoreDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_document_ids(
        &self,
        collection: &CollectionPath,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let state = self.state();
        if state.failing_reads.contains(collection) {
            return Err(AppError::store(format!("read of {collection} failed")));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.keys()
                    .filter(|id| after.is_none_or(|cursor| id.as_str() > cursor))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_subcollections(
        &self,
        parent: &CollectionPath,
        name: &str,
    ) -> Result<Vec<CollectionPath>> {
        let state = self.state();
        if state.failing_reads.contains(parent) {
            return Err(AppError::store(format!("read of {parent} failed")));
        }
        Ok(state
            .collections
            .iter()
            .filter(|(path, docs)| {
                !docs.is_empty() && path.parent_id_under(parent, name).is_some()
            })
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut state = self.state();
        state.commit_attempts += 1;
        if state.fail_on_commit == Some(state.commit_attempts) {
            return Err(AppError::store("simulated network failure"));
        }
        self.limits.check_commit(&ops)?;

        for op in &ops {
            match op {
                WriteOp::Set { path, data } => {
                    state
                        .collections
                        .entry(path.collection.clone())
                        .or_default()
                        .insert(path.id.clone(), fields_from_stored_json(data.clone()));
                }
                WriteOp::Delete { path } => {
                    if let Some(docs) = state.collections.get_mut(&path.collection) {
                        docs.remove(&path.id);
                    }
                }
            }
        }
        state.committed.push(ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_failing_commit_applies_nothing() {
        let store = MemoryDocumentStore::new().failing_commit(1);
        let coll = CollectionPath::for_owner("u", "tasks");
        let op = WriteOp::Set {
            path: coll.document("t1"),
            data: json!({"id": "t1"}).as_object().cloned().unwrap(),
        };

        assert!(store.commit(vec![op.clone()]).await.is_err());
        assert_eq!(store.len(&coll), 0);

        store.commit(vec![op]).await.unwrap();
        assert_eq!(store.len(&coll), 1);
        assert_eq!(store.committed_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_subcollections_listed_without_parent() {
        let store = MemoryDocumentStore::new();
        let materials = CollectionPath::for_owner("u", "materials");
        let orphan = materials.subcollection("gone", "chats");
        let op = WriteOp::Set {
            path: orphan.document("c1"),
            data: json!({"id": "c1"}).as_object().cloned().unwrap(),
        };
        store.commit(vec![op]).await.unwrap();

        let found = store.list_subcollections(&materials, "chats").await.unwrap();
        assert_eq!(found, vec![orphan.clone()]);

        store
            .commit(vec![WriteOp::Delete {
                path: orphan.document("c1"),
            }])
            .await
            .unwrap();
        assert!(store.list_subcollections(&materials, "chats").await.unwrap().is_empty());
    }
}
