//! Document store interface.
//!
//! The remote store is a collaborator: this module only names the
//! primitives the engine consumes (read-all, paged id listing, subcollection
//! discovery, batched commit) and the hard ceilings the store enforces on
//! them.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::value::serialized_size;
use crate::domain::{AppError, Result, StoreDocument};

/// Path of a collection, e.g. `users/u1/materials/m1/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection scoped to one user.
    #[must_use]
    pub fn for_owner(owner_id: &str, name: &str) -> Self {
        Self(format!("users/{owner_id}/{name}"))
    }

    /// A subcollection under one document of this collection.
    #[must_use]
    pub fn subcollection(&self, parent_id: &str, name: &str) -> Self {
        Self(format!("{}/{parent_id}/{name}", self.0))
    }

    /// Path of a document in this collection.
    #[must_use]
    pub fn document(&self, id: &str) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a path string read back from storage.
    #[must_use]
    pub const fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    /// Parent document id when this is the `name` subcollection of a
    /// document directly inside `parent`.
    #[must_use]
    pub fn parent_id_under(&self, parent: &Self, name: &str) -> Option<&str> {
        let rest = self.0.strip_prefix(parent.as_str())?.strip_prefix('/')?;
        let id = rest.strip_suffix(name)?.strip_suffix('/')?;
        (!id.is_empty() && !id.contains('/')).then_some(id)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// One operation inside a batched commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite the document (upsert by id).
    Set {
        path: DocumentPath,
        data: Map<String, Value>,
    },
    /// Remove the document if it exists.
    Delete { path: DocumentPath },
}

impl WriteOp {
    #[cfg(test)]
    #[must_use]
    pub const fn path(&self) -> &DocumentPath {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Hard limits the store enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_document_bytes: usize,
    pub max_ops_per_commit: usize,
    pub max_commit_bytes: usize,
}

impl StoreLimits {
    /// Limits of the production store.
    pub const HARD: Self = Self {
        max_document_bytes: 1_048_576,
        max_ops_per_commit: 500,
        max_commit_bytes: 10 * 1_048_576,
    };

    /// Check a single document body.
    ///
    /// # Errors
    /// Returns a store error if the body exceeds the document limit.
    pub fn check_document(&self, path: &DocumentPath, data: &Map<String, Value>) -> Result<usize> {
        let size = serialized_size(data)?;
        if size > self.max_document_bytes {
            return Err(AppError::store(format!(
                "document {path} is {size} bytes, limit is {}",
                self.max_document_bytes
            )));
        }
        Ok(size)
    }

    /// Check a whole commit. Violating commits are rejected entirely.
    ///
    /// # Errors
    /// Returns a store error describing the violated limit.
    pub fn check_commit(&self, ops: &[WriteOp]) -> Result<()> {
        if ops.len() > self.max_ops_per_commit {
            return Err(AppError::store(format!(
                "commit has {} operations, limit is {}",
                ops.len(),
                self.max_ops_per_commit
            )));
        }

        let mut total = 0;
        for op in ops {
            if let WriteOp::Set { path, data } = op {
                total += self.check_document(path, data)?;
            }
        }

        if total > self.max_commit_bytes {
            return Err(AppError::store(format!(
                "commit payload is {total} bytes, limit is {}",
                self.max_commit_bytes
            )));
        }
        Ok(())
    }
}

/// Primitives of the remote document store.
///
/// Every call is a suspension point; callers issue them one at a time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every document of a collection, ordered by id.
    async fn list_documents(&self, collection: &CollectionPath) -> Result<Vec<StoreDocument>>;

    /// Up to `limit` document ids greater than `after`, in ascending order.
    async fn list_document_ids(
        &self,
        collection: &CollectionPath,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Every non-empty `name` subcollection under documents of `parent`,
    /// whether or not the parent document itself exists.
    async fn list_subcollections(
        &self,
        parent: &CollectionPath,
        name: &str,
    ) -> Result<Vec<CollectionPath>>;

    /// Apply all operations atomically.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Count documents by paging through ids.
    async fn count_documents(&self, collection: &CollectionPath) -> Result<usize> {
        const PAGE: usize = 1000;

        let mut total = 0;
        let mut cursor: Option<String> = None;
        loop {
            let ids = self
                .list_document_ids(collection, cursor.as_deref(), PAGE)
                .await?;
            let Some(last) = ids.last() else {
                break;
            };
            total += ids.len();
            cursor = Some(last.clone());
        }
        Ok(total)
    }
}
