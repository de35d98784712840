//! In-process store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{public_url_for, BlobStore};
use crate::error::StorageError;

/// Objects kept in a map. Contents are lost on drop.
pub struct MemoryStore {
    public_base_url: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    puts: AtomicU32,
}

impl MemoryStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: RwLock::new(HashMap::new()),
            puts: AtomicU32::new(0),
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `put` calls received, including ones that found the key present.
    pub fn put_calls(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Stored content type for `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, key: &str) -> Result<Option<String>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects
            .contains_key(key)
            .then(|| public_url_for(&self.public_base_url, key)))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| (bytes, content_type.to_string()));
        Ok(public_url_for(&self.public_base_url, key))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.objects.read().await.get(key).map(|(b, _)| b.clone()))
    }
}
