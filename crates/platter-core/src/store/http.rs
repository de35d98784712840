//! Remote object store reached over HTTP.
//!
//! Objects are written with an authenticated `PUT <endpoint>/<key>` and read
//! back from `<public_base_url>/<key>`. A PUT of the same key with the same
//! bytes is idempotent, which is all content addressing needs.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{public_url_for, BlobStore};
use crate::config::{resolve_env_var, HttpStoreConfig};
use crate::error::StorageError;

/// Cache directive stored with every object.
const OBJECT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Optional body of a successful PUT.
#[derive(Debug, Deserialize)]
struct PutResponse {
    url: Option<String>,
}

/// Object store behind a PUT endpoint with bearer authentication.
pub struct HttpStore {
    client: Client,
    endpoint: String,
    public_base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Build from the `[storage.http]` section.
    ///
    /// A missing section or token is not an error here; writes fail with
    /// `StorageUnavailable` instead.
    pub fn from_config(
        config: Option<&HttpStoreConfig>,
        timeout_ms: u64,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| StorageError::StorageUnavailable(format!("client setup failed: {e}")))?;

        let (endpoint, public_base_url, token) = match config {
            Some(c) => (
                c.endpoint.trim().to_string(),
                c.public_base_url.trim().to_string(),
                resolve_env_var(&c.token),
            ),
            None => (String::new(), String::new(), None),
        };

        if token.is_none() {
            tracing::warn!("HTTP store has no write token; uploads will fail");
        }

        Ok(Self {
            client,
            endpoint,
            public_base_url,
            token,
        })
    }

    fn credentials(&self) -> Result<&str, StorageError> {
        if self.endpoint.is_empty() || self.public_base_url.is_empty() {
            return Err(StorageError::StorageUnavailable(
                "storage.http endpoint is not configured".to_string(),
            ));
        }
        self.token.as_deref().ok_or_else(|| {
            StorageError::StorageUnavailable("storage.http token is not set".to_string())
        })
    }

    fn unavailable(err: reqwest::Error) -> StorageError {
        StorageError::StorageUnavailable(format!("object store request failed: {err}"))
    }
}

#[async_trait]
impl BlobStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn exists(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.public_base_url.is_empty() {
            return Ok(None);
        }
        let url = public_url_for(&self.public_base_url, key);
        match self.client.head(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(Some(url)),
            Ok(_) => Ok(None),
            Err(e) => {
                // A failed existence check only costs a redundant PUT.
                tracing::debug!(key = %key, error = %e, "Existence check failed");
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let token = self.credentials()?;
        let size = bytes.len();

        let response = self
            .client
            .put(public_url_for(&self.endpoint, key))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, OBJECT_CACHE_CONTROL)
            .body(bytes)
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::StorageUnavailable(format!(
                "object store returned HTTP {}",
                status.as_u16()
            )));
        }

        let public_url = response
            .json::<PutResponse>()
            .await
            .ok()
            .and_then(|body| body.url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| public_url_for(&self.public_base_url, key));

        tracing::debug!(key = %key, size, "Uploaded object");
        Ok(public_url)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        if self.public_base_url.is_empty() {
            return Ok(None);
        }
        let response = self
            .client
            .get(public_url_for(&self.public_base_url, key))
            .send()
            .await
            .map_err(Self::unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => response.bytes().await.map(Some).map_err(Self::unavailable),
            s => Err(StorageError::StorageUnavailable(format!(
                "object store returned HTTP {}",
                s.as_u16()
            ))),
        }
    }
}
