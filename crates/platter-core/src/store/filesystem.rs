//! Local directory store.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never sees a partial object and concurrent writers of the same key
//! both end with the same complete file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::{public_url_for, BlobStore};
use crate::error::StorageError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Objects stored as files beneath `root`, published under `public_base_url`.
pub struct FilesystemStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemStore {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn unavailable(&self, action: &str, err: std::io::Error) -> StorageError {
        StorageError::StorageUnavailable(format!(
            "failed to {action} under {}: {err}",
            self.root.display()
        ))
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn exists(&self, key: &str) -> Result<Option<String>, StorageError> {
        let present = fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| self.unavailable("stat object", e))?;
        Ok(present.then(|| public_url_for(&self.public_base_url, key)))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable("create directory", e))?;
        }

        let temp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.unavailable("write object", e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.unavailable("publish object", e));
        }

        tracing::debug!(
            key = %key,
            path = %path.display(),
            size = bytes.len(),
            "Stored object"
        );

        Ok(public_url_for(&self.public_base_url, key))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.unavailable("read object", e)),
        }
    }
}
