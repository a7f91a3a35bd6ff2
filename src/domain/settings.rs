//! Application configuration and engine ceilings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};

/// Size and count limits the engine enforces before anything is queued.
///
/// The store itself rejects documents over 1 MiB and oversized
/// transactions; these defaults stay safely under those limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ceilings {
    /// Largest serialized document that will be written.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,

    /// Byte budget of one write batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Documents per write batch.
    #[serde(default = "default_max_batch_writes")]
    pub max_batch_writes: usize,

    /// Deletions per delete batch.
    #[serde(default = "default_max_batch_deletes")]
    pub max_batch_deletes: usize,

    /// Report progress every this many processed documents.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for Ceilings {
    fn default() -> Self {
        Self {
            max_document_bytes: default_max_document_bytes(),
            max_batch_bytes: default_max_batch_bytes(),
            max_batch_writes: default_max_batch_writes(),
            max_batch_deletes: default_max_batch_deletes(),
            progress_interval: default_progress_interval(),
        }
    }
}

const fn default_max_document_bytes() -> usize {
    1_000_000
}

const fn default_max_batch_bytes() -> usize {
    500_000
}

const fn default_max_batch_writes() -> usize {
    50
}

const fn default_max_batch_deletes() -> usize {
    400
}

const fn default_progress_interval() -> usize {
    20
}

impl Ceilings {
    /// Reject limits that would stall or misbehave.
    ///
    /// # Errors
    /// Returns a configuration error naming the first zero limit.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("max_document_bytes", self.max_document_bytes),
            ("max_batch_bytes", self.max_batch_bytes),
            ("max_batch_writes", self.max_batch_writes),
            ("max_batch_deletes", self.max_batch_deletes),
            ("progress_interval", self.progress_interval),
        ];

        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(AppError::Config {
                message: format!("limits.{name} must be greater than zero"),
            }),
            None => Ok(()),
        }
    }
}

/// Account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// User whose dataset is exported, restored and reset.
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            owner_id: default_owner_id(),
        }
    }
}

fn default_owner_id() -> String {
    "local".to_string()
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub limits: Ceilings,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".study-vault")
    }

    /// Path of the `SQLite` document store.
    #[must_use]
    pub fn store_db_path(&self) -> PathBuf {
        self.data_dir().join("store.db")
    }

    /// Path of the local key-value cache.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir().join("cache.db")
    }

    /// Default destination for export archives.
    #[must_use]
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir().join("exports")
    }
}
