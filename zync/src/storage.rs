//! Persistence for the auth token.
//!
//! The token is the only value the client persists. It lives under
//! [`AUTH_TOKEN_KEY`], is written on login, deleted on logout and read once at
//! startup by [`crate::session::SessionAction::Restore`].

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Storage key of the auth token
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key contains characters that cannot be used as a file name
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Underlying I/O failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// In-memory store lock was poisoned
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future returned by [`TokenStorage`] operations
pub type StorageFuture<T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send>>;

/// Key/value store for small secrets
pub trait TokenStorage: Send + Sync {
    /// Read the value under `key`, `None` if nothing is stored
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn load(&self, key: &str) -> StorageFuture<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the value cannot be written.
    fn save(&self, key: &str, value: String) -> StorageFuture<()>;

    /// Remove the value under `key`; removing a missing key succeeds
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the value cannot be removed.
    fn delete(&self, key: &str) -> StorageFuture<()>;
}

/// Process-local storage for tests and development
#[derive(Clone, Debug, Default)]
pub struct InMemoryTokenStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryTokenStorage {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `value` under `key`
    #[must_use]
    pub fn with_value(key: &str, value: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut values) = storage.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        storage
    }

    /// Synchronous read, for assertions
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|v| v.get(key).cloned())
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> StorageResult<T> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&mut values))
    }
}

impl TokenStorage for InMemoryTokenStorage {
    fn load(&self, key: &str) -> StorageFuture<Option<String>> {
        let result = self.with_values(|v| v.get(key).cloned());
        Box::pin(async move { result })
    }

    fn save(&self, key: &str, value: String) -> StorageFuture<()> {
        let result = self.with_values(|v| {
            v.insert(key.to_string(), value);
        });
        Box::pin(async move { result })
    }

    fn delete(&self, key: &str) -> StorageFuture<()> {
        let result = self.with_values(|v| {
            v.remove(key);
        });
        Box::pin(async move { result })
    }
}

/// Stores each key as a file inside a directory
///
/// The directory is created on first write.
#[derive(Clone, Debug)]
pub struct FileTokenStorage {
    dir: PathBuf,
}

impl FileTokenStorage {
    /// Creates a store rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(self.dir.join(key))
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self, key: &str) -> StorageFuture<Option<String>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read_to_string(path?).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn save(&self, key: &str, value: String) -> StorageFuture<()> {
        let path = self.path_for(key);
        let dir = self.dir.clone();
        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, value).await?;
            tracing::debug!(path = %path.display(), "Token persisted");
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StorageFuture<()> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(path?).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("zync-storage-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let storage = InMemoryTokenStorage::new();
        assert_eq!(storage.load(AUTH_TOKEN_KEY).await.unwrap(), None);

        storage.save(AUTH_TOKEN_KEY, "abc".to_string()).await.unwrap();
        assert_eq!(storage.peek(AUTH_TOKEN_KEY).as_deref(), Some("abc"));

        storage.delete(AUTH_TOKEN_KEY).await.unwrap();
        assert_eq!(storage.load(AUTH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_storage_survives_a_new_instance() {
        let dir = scratch_dir();
        FileTokenStorage::new(&dir)
            .save(AUTH_TOKEN_KEY, "persisted".to_string())
            .await
            .unwrap();

        let reopened = FileTokenStorage::new(&dir);
        assert_eq!(
            reopened.load(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
            Some("persisted")
        );

        reopened.delete(AUTH_TOKEN_KEY).await.unwrap();
        reopened.delete(AUTH_TOKEN_KEY).await.unwrap();
        assert_eq!(reopened.load(AUTH_TOKEN_KEY).await.unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn file_storage_rejects_path_like_keys() {
        let storage = FileTokenStorage::new(scratch_dir());
        let result = storage.save("../escape", "x".to_string()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
