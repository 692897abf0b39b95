//! JSON persistence in the `.storage/` directory
//!
//! Every persisted collection (config entries, entity registry, device
//! registry) is written as a versioned envelope:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "core.entity_registry",
//!   "data": { ... }
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Migration required for {key}: stored v{found}, current v{expected}")]
    MigrationRequired {
        key: String,
        expected: u32,
        found: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Versioned wrapper written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

/// A collection that knows its own storage key and schema version
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Handle on the `.storage/` directory under a config dir
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// # Arguments
    /// * `config_dir` - Path to the Home Assistant config directory
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Load a collection, returning `None` when nothing has been saved yet.
    ///
    /// A stored major version that differs from `T::VERSION` is refused;
    /// an older minor version is accepted with a warning.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let path = self.file_path(T::KEY);
        if !fs::try_exists(&path).await? {
            debug!(key = T::KEY, "Storage file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let file: StorageFile<T> = serde_json::from_str(&content)?;

        if file.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                stored = file.minor_version,
                current = T::MINOR_VERSION,
                "Loading storage with an older minor version"
            );
        }

        debug!(key = T::KEY, "Loaded storage file (v{}.{})", file.version, file.minor_version);
        Ok(Some(file.data))
    }

    /// Save a collection atomically (temp file, then rename)
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;

        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = T::KEY, "Saved storage file");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            debug!(key, "Deleted storage file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Counters {
        name: String,
        value: i32,
    }

    impl Storable for Counters {
        const KEY: &'static str = "test.counters";
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let data = Counters {
            name: "bridge".into(),
            value: 42,
        };

        storage.save(&data).await.unwrap();
        assert!(storage.exists("test.counters").await);
        assert!(!storage.exists("test.counters.tmp").await);

        let loaded: Option<Counters> = storage.load().await.unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let loaded: Option<Counters> = storage.load().await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_major_version_mismatch_is_refused() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();
        std::fs::write(
            storage.file_path("test.counters"),
            r#"{"version":1,"minor_version":1,"key":"test.counters","data":{"name":"x","value":1}}"#,
        )
        .unwrap();

        let result = storage.load::<Counters>().await;
        assert!(matches!(
            result,
            Err(StorageError::MigrationRequired {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage
            .save(&Counters {
                name: "x".into(),
                value: 1,
            })
            .await
            .unwrap();

        storage.delete("test.counters").await.unwrap();
        assert!(!storage.exists("test.counters").await);
        // Deleting again is a no-op
        storage.delete("test.counters").await.unwrap();
    }
}
