//! `SQLite`-backed document store.
//!
//! Stores every document as one JSON row keyed by `(collection, id)`.
//! Batched commits run inside a single transaction and are checked against
//! the same hard ceilings as the hosted store.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::value::fields_from_stored_json;
use crate::domain::{AppError, Result, StoreDocument};

use super::store::{CollectionPath, DocumentStore, StoreLimits, WriteOp};

/// Document store persisted in a local `SQLite` file.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    limits: StoreLimits,
}

impl SqliteDocumentStore {
    /// Opens or creates the store database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create store directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::database)?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            limits: StoreLimits::HARD,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (collection, id)
            );
            ",
        )
        .map_err(AppError::database)
    }

    fn decode_row(id: String, raw: &str) -> Result<StoreDocument> {
        let value: Value = serde_json::from_str(raw).map_err(AppError::json_parse)?;
        let fields = match value {
            Value::Object(map) => fields_from_stored_json(map),
            _ => {
                return Err(AppError::InvalidData {
                    message: format!("document {id} is not a JSON object"),
                })
            }
        };
        Ok(StoreDocument { id, fields })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_documents(&self, collection: &CollectionPath) -> Result<Vec<StoreDocument>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([collection.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(AppError::database)?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, raw) = row.map_err(AppError::database)?;
            documents.push(Self::decode_row(id, &raw)?);
        }

        tracing::debug!(
            collection = %collection,
            documents = documents.len(),
            "Listed documents"
        );

        Ok(documents)
    }

    async fn list_document_ids(
        &self,
        collection: &CollectionPath,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id FROM documents
                 WHERE collection = ?1 AND (?2 IS NULL OR id > ?2)
                 ORDER BY id LIMIT ?3",
            )
            .map_err(AppError::database)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![collection.as_str(), after, limit], |row| {
                row.get::<_, String>(0)
            })
            .map_err(AppError::database)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)
    }

    async fn list_subcollections(
        &self,
        parent: &CollectionPath,
        name: &str,
    ) -> Result<Vec<CollectionPath>> {
        let pattern = format!(
            "{}/%/{}",
            escape_like(parent.as_str()),
            escape_like(name)
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r"SELECT DISTINCT collection FROM documents
                  WHERE collection LIKE ?1 ESCAPE '\'
                  ORDER BY collection",
            )
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([pattern], |row| row.get::<_, String>(0))
            .map_err(AppError::database)?;

        let mut found = Vec::new();
        for row in rows {
            let candidate = CollectionPath::from_raw(row.map_err(AppError::database)?);
            if candidate.parent_id_under(parent, name).is_some() {
                found.push(candidate);
            }
        }
        Ok(found)
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.limits.check_commit(&ops)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(AppError::database)?;

        for op in &ops {
            match op {
                WriteOp::Set { path, data } => {
                    let raw = serde_json::to_string(data).map_err(AppError::json_parse)?;
                    tx.execute(
                        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
                         ON CONFLICT(collection, id) DO UPDATE SET
                            data = excluded.data,
                            updated_at = datetime('now')",
                        params![path.collection.as_str(), &path.id, raw],
                    )
                    .map_err(AppError::database)?;
                }
                WriteOp::Delete { path } => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![path.collection.as_str(), &path.id],
                    )
                    .map_err(AppError::database)?;
                }
            }
        }

        tx.commit().map_err(AppError::database)?;

        tracing::debug!(operations = ops.len(), "Committed batch");

        Ok(())
    }
}

/// Escape `LIKE` wildcards with a backslash.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
