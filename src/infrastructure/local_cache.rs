//! Local key-value cache handle.
//!
//! The cache mirrors store data for fast reads. The engine only ever
//! clears it wholesale after the store changed underneath it.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::domain::{AppError, Result};

/// Something that can drop all locally cached data.
pub trait CacheInvalidator: Send {
    /// Remove every cached entry. Returns how many were removed.
    ///
    /// # Errors
    /// Returns error if the cache cannot be cleared.
    fn invalidate(&mut self) -> Result<usize>;
}

/// Handle to the `SQLite`-backed local cache.
///
/// The connection is opened lazily and can be closed and reopened; a failed
/// clear is retried once on a fresh connection.
pub struct LocalCache {
    path: PathBuf,
    conn: Option<Connection>,
}

impl LocalCache {
    /// Opens or creates the cache database.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let mut cache = Self {
            path: path.to_path_buf(),
            conn: None,
        };
        cache.connection()?;
        Ok(cache)
    }

    /// Whether a connection is currently held.
    #[cfg(test)]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the connection. The next operation reopens it.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(error = %e, "Failed to close cache connection cleanly");
            }
        }
    }

    /// Number of cached entries.
    ///
    /// # Errors
    /// Returns error if the cache cannot be queried.
    pub fn len(&mut self) -> Result<usize> {
        let count: i64 = self
            .connection()?
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| AppError::cache("Failed to count cache entries", e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    /// Returns error if the cache cannot be queried.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Store a value.
    ///
    /// # Errors
    /// Returns error if the write fails.
    #[cfg(test)]
    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.connection()?
            .execute(
                "INSERT INTO entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .map_err(|e| AppError::cache("Failed to write cache entry", e))?;
        Ok(())
    }

    /// Delete every entry in one transaction, reopening once on failure.
    ///
    /// # Errors
    /// Returns error if the clear fails on a fresh connection too.
    pub fn clear_all(&mut self) -> Result<usize> {
        match self.try_clear() {
            Ok(removed) => Ok(removed),
            Err(first) => {
                tracing::warn!(error = %first, "Cache clear failed, reopening and retrying");
                self.close();
                self.try_clear()
            }
        }
    }

    fn try_clear(&mut self) -> Result<usize> {
        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::cache("Failed to begin cache transaction", e))?;
        let removed = tx
            .execute("DELETE FROM entries", [])
            .map_err(|e| AppError::cache("Failed to clear cache", e))?;
        tx.commit()
            .map_err(|e| AppError::cache("Failed to commit cache clear", e))?;

        tracing::info!(removed, path = %self.path.display(), "Local cache cleared");

        Ok(removed)
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            self.conn = Some(Self::connect(&self.path)?);
        }
        self.conn.as_mut().ok_or_else(|| AppError::Cache {
            message: "cache connection unavailable".into(),
            source: None,
        })
    }

    fn connect(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create cache directory", e))?;
        }

        let conn =
            Connection::open(path).map_err(|e| AppError::cache("Failed to open cache", e))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
             );",
        )
        .map_err(|e| AppError::cache("Failed to initialize cache schema", e))?;

        Ok(conn)
    }
}

impl CacheInvalidator for LocalCache {
    fn invalidate(&mut self) -> Result<usize> {
        self.clear_all()
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_empty_cache() {
        let dir = tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.db")).unwrap();
        assert!(cache.is_open());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_clear_all_removes_everything() {
        let dir = tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.db")).unwrap();
        cache.put("tasks", "[]").unwrap();
        cache.put("notes", "[]").unwrap();

        assert_eq!(cache.clear_all().unwrap(), 2);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn test_reopens_after_close() {
        let dir = tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.db")).unwrap();
        cache.put("k", "v").unwrap();

        cache.close();
        assert!(!cache.is_open());

        assert_eq!(cache.invalidate().unwrap(), 1);
        assert!(cache.is_open());
    }
}
