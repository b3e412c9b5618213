mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Listing failed: {0}")]
    Unavailable(String),
    #[error("URL resolution failed for {key}: {reason}")]
    Resolution { key: String, reason: String },
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over object storage backends. The namespace is flat; keys
/// contain '/' separators and folders exist only as key prefixes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    /// All keys under the given prefix, in backend order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
    /// A retrievable link for the object; stable or time-limited per backend
    async fn resolve_url(&self, key: &str) -> Result<String, ObjectStoreError>;
    /// Fails NotFound when the key is absent
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
}

/// One downloadable object in a folder view. Recomputed per listing,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct FolderEntry {
    /// Key relative to the listed folder
    pub name: String,
    pub url: String,
}

fn folder_prefix(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Present a folder prefix as downloadable entries.
///
/// URL resolution for all entries runs concurrently. The call is
/// all-or-nothing: a listing failure or any single resolution failure fails
/// the whole view, and the first failure drops the in-flight siblings.
pub async fn list_folder(
    store: &dyn ObjectStore,
    folder: &str,
) -> Result<Vec<FolderEntry>, ObjectStoreError> {
    let prefix = folder_prefix(folder);
    let keys = store.list(&prefix).await?;

    let urls =
        futures::future::try_join_all(keys.iter().map(|key| store.resolve_url(key))).await?;

    Ok(keys
        .into_iter()
        .zip(urls)
        .map(|(key, url)| FolderEntry {
            name: key.strip_prefix(&prefix).unwrap_or(&key).to_string(),
            url,
        })
        .collect())
}

/// Delete one object from a folder. Fails NotFound when absent.
pub async fn delete_entry(
    store: &dyn ObjectStore,
    folder: &str,
    name: &str,
) -> Result<(), ObjectStoreError> {
    let key = format!("{}{}", folder_prefix(folder), name);
    store.delete(&key).await
}

/// Store a completion artifact under a folder
pub async fn upload_entry(
    store: &dyn ObjectStore,
    folder: &str,
    name: &str,
    data: Bytes,
) -> Result<String, ObjectStoreError> {
    let key = format!("{}{}", folder_prefix(folder), name);
    store.put(&key, data).await?;
    Ok(key)
}
