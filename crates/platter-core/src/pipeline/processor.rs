//! Pipeline orchestration - wires together all ingest stages.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::response::{OutboundResponse, ResponsePolicy};
use crate::store::ContentStore;
use crate::types::{ImageRequest, IngestReport, Ingested};

use super::fetch::{Fetcher, HttpFetcher};
use super::guard::UrlGuard;
use super::validate::Validator;

/// Runs one request through guard, fetch, validation and storage.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct Ingestor {
    guard: UrlGuard,
    validator: Validator,
    fetcher: Arc<dyn Fetcher>,
    store: ContentStore,
    policy: ResponsePolicy,
}

impl Ingestor {
    /// Create an ingestor with explicit fetch and store backends.
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>, store: ContentStore) -> Self {
        Self {
            guard: UrlGuard::new(config.guard.clone()),
            validator: Validator::new(config.validation.clone()),
            fetcher,
            store,
            policy: ResponsePolicy::new(config.response.clone()),
        }
    }

    /// Create an ingestor with the production fetcher and the configured store.
    pub fn from_config(config: &Config) -> Result<Self> {
        let guard = UrlGuard::new(config.guard.clone());
        let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone(), guard)?);
        let store = ContentStore::from_config(config)?;
        Ok(Self::new(config, fetcher, store))
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn policy(&self) -> &ResponsePolicy {
        &self.policy
    }

    /// Run the full pipeline for one request.
    pub async fn ingest(&self, request: &ImageRequest) -> std::result::Result<Ingested, IngestError> {
        let start = Instant::now();
        let result = self.run(request).await;

        match &result {
            Ok(ingested) => tracing::info!(
                key = %ingested.asset.storage_key,
                bytes = ingested.asset.byte_length,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Stored image"
            ),
            Err(e) => tracing::warn!(
                kind = %e.kind(),
                upstream_status = e.upstream_status(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Image ingest failed"
            ),
        }
        result
    }

    async fn run(&self, request: &ImageRequest) -> std::result::Result<Ingested, IngestError> {
        let target = self.guard.resolve(&request.raw_url)?;
        tracing::debug!(host = %target.host(), "Guard passed");

        self.validator.check_source(&target)?;

        let fetch_start = Instant::now();
        let outcome = self
            .fetcher
            .fetch(&target, request.referer_hint.as_deref())
            .await?;
        tracing::debug!(
            fetcher = self.fetcher.name(),
            status = outcome.status,
            content_type = outcome.declared_content_type.as_deref().unwrap_or("-"),
            "Upstream responded in {:?}",
            fetch_start.elapsed()
        );

        let validate_start = Instant::now();
        let content = self.validator.validate(outcome).await?;
        tracing::trace!("  Validate: {:?}", validate_start.elapsed());

        let store_start = Instant::now();
        let asset = self.store.store(&content).await?;
        tracing::trace!("  Store: {:?}", store_start.elapsed());

        Ok(Ingested { asset, content })
    }

    /// Ingest and map the result to a client response.
    pub async fn handle(&self, request: &ImageRequest) -> OutboundResponse {
        let result = self.ingest(request).await;
        self.policy.respond(&result)
    }

    /// Ingest and summarize the result for reporting.
    pub async fn report(&self, request: &ImageRequest) -> IngestReport {
        let start = Instant::now();
        let result = self.ingest(request).await;
        IngestReport::from_result(
            &request.raw_url,
            &result,
            start.elapsed().as_millis() as u64,
        )
    }
}
