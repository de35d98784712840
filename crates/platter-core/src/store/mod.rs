//! Content-addressable durable store.
//!
//! Keys are derived from the bytes (`images/<blake3>.<ext>`), so writing the
//! same image twice is a no-op and concurrent writers agree on the result.
//! Backends only need to provide `exists`, `put` and `get`.

mod filesystem;
mod http;
mod memory;

pub use filesystem::FilesystemStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{Config, StorageBackend};
use crate::error::StorageError;
use crate::pipeline::hash::{Hasher, KEY_PREFIX};
use crate::types::{StoredAsset, ValidatedAsset};

/// A durable object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Public URL of `key` if it is already stored.
    async fn exists(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `bytes` under `key` and return its public URL.
    ///
    /// Must be safe to call concurrently for the same key.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str)
        -> Result<String, StorageError>;

    /// Read a stored object back.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;
}

/// Content addressing on top of a [`BlobStore`].
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn BlobStore>,
    timeout_ms: u64,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn BlobStore>, timeout_ms: u64) -> Self {
        Self {
            backend,
            timeout_ms,
        }
    }

    /// Build the backend selected by `storage.backend`.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let storage = &config.storage;
        let backend: Arc<dyn BlobStore> = match storage.backend {
            StorageBackend::Filesystem => Arc::new(FilesystemStore::new(
                config.storage_root(),
                storage.filesystem.public_base_url.clone(),
            )),
            StorageBackend::Http => {
                Arc::new(HttpStore::from_config(storage.http.as_ref(), storage.timeout_ms)?)
            }
            StorageBackend::Memory => Arc::new(MemoryStore::new(
                storage.filesystem.public_base_url.clone(),
            )),
        };
        tracing::debug!(backend = backend.name(), "Configured content store");
        Ok(Self::new(backend, storage.timeout_ms))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Store a validated asset under its content key.
    ///
    /// Existing objects are reused without a write. The whole operation is
    /// bounded by `storage.timeout_ms`.
    pub async fn store(&self, asset: &ValidatedAsset) -> Result<StoredAsset, StorageError> {
        let content_hash = Hasher::content_hash_from_bytes(asset.bytes());
        let extension =
            Hasher::extension_for(Some(asset.content_type()), Some(asset.source_url()));
        let storage_key = Hasher::storage_key(&content_hash, &extension);
        let content_type = asset.content_type().mime();

        let write = async {
            if let Some(public_url) = self.backend.exists(&storage_key).await? {
                tracing::debug!(key = %storage_key, "Object already stored, reusing");
                return Ok(public_url);
            }
            self.backend
                .put(&storage_key, asset.bytes().clone(), content_type)
                .await
        };

        let public_url = tokio::time::timeout(Duration::from_millis(self.timeout_ms), write)
            .await
            .map_err(|_| {
                StorageError::StorageUnavailable(format!(
                    "{} write timed out after {}ms",
                    self.backend.name(),
                    self.timeout_ms
                ))
            })??;

        Ok(StoredAsset {
            content_hash,
            extension,
            storage_key,
            public_url,
            byte_length: asset.byte_length(),
            content_type: content_type.to_string(),
        })
    }

    /// Read an object back by key. Malformed keys are treated as absent.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        if !is_valid_key(key) {
            return Ok(None);
        }
        self.backend.get(key).await
    }
}

/// Whether `key` has the shape `images/<hex>.<ext>`.
///
/// Keeps caller-supplied names from escaping the store root.
pub fn is_valid_key(key: &str) -> bool {
    let Some(file) = key
        .strip_prefix(KEY_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return false;
    };
    let Some((hash, ext)) = file.split_once('.') else {
        return false;
    };
    !hash.is_empty()
        && hash.len() <= 128
        && hash.bytes().all(|b| b.is_ascii_hexdigit())
        && !ext.is_empty()
        && ext.len() <= 8
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Join a base URL and a key with exactly one slash.
pub(crate) fn public_url_for(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}
