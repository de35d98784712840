//! Bounded remote fetch.
//!
//! One GET per hop, redirects followed by hand so every hop goes back through
//! the guard, and every hostname is resolved and checked before connecting.
//! The client's own lookups are checked too, so a second DNS answer cannot
//! send the connection somewhere else. A single deadline covers all hops and
//! the body.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION, REFERER};
use reqwest::redirect::Policy;
use tokio::time::Instant;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, GuardError, IngestError};
use crate::pipeline::guard::UrlGuard;
use crate::pipeline::resolve::{
    find_blocked, GuardedResolver, HostResolver, LookupError, SystemResolver,
};
use crate::types::ResolvedTarget;

/// Accept header sent upstream; lists only types the validator allows.
pub const ACCEPT_IMAGES: &str =
    "image/avif,image/webp,image/png,image/jpeg,image/gif,image/*;q=0.8";

/// Upper bound on the initial body buffer, whatever the origin declares.
const INITIAL_BUFFER_BYTES: usize = 64 * 1024;

/// Response headers plus a lazily read, capped body.
pub struct FetchOutcome {
    /// Final HTTP status (always 2xx)
    pub status: u16,

    /// `Content-Type` as declared by the origin
    pub declared_content_type: Option<String>,

    /// URL of the last hop
    pub final_url: Url,

    pub body: FetchBody,
}

impl std::fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOutcome")
            .field("status", &self.status)
            .field("declared_content_type", &self.declared_content_type)
            .field("final_url", &self.final_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Response body that has not been read yet.
///
/// Reading enforces the byte cap chunk by chunk and the fetch deadline.
pub struct FetchBody {
    stream: BoxStream<'static, Result<Bytes, FetchError>>,
    max_bytes: u64,
    deadline: Option<(Instant, u64)>,
}

impl FetchBody {
    /// Wrap any chunk stream with a byte cap.
    pub fn from_stream(
        stream: BoxStream<'static, Result<Bytes, FetchError>>,
        max_bytes: u64,
    ) -> Self {
        Self {
            stream,
            max_bytes,
            deadline: None,
        }
    }

    /// Body made of in-memory chunks. Used by fakes and tests.
    pub fn from_chunks(chunks: Vec<Bytes>, max_bytes: u64) -> Self {
        Self::from_stream(stream::iter(chunks.into_iter().map(Ok)).boxed(), max_bytes)
    }

    fn with_deadline(mut self, deadline: Instant, timeout_ms: u64) -> Self {
        self.deadline = Some((deadline, timeout_ms));
        self
    }

    /// Drain the body, failing as soon as the running total passes the cap.
    ///
    /// The buffer never holds more than `max_bytes`.
    pub async fn read_capped(mut self) -> Result<Bytes, FetchError> {
        let capacity = (self.max_bytes as usize).min(INITIAL_BUFFER_BYTES);
        let mut buffer = BytesMut::with_capacity(capacity);

        loop {
            let next = match self.deadline {
                Some((deadline, timeout_ms)) => {
                    tokio::time::timeout_at(deadline, self.stream.next())
                        .await
                        .map_err(|_| FetchError::UpstreamTimeout { timeout_ms })?
                }
                None => self.stream.next().await,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk?;

            let total = buffer.len() as u64 + chunk.len() as u64;
            if total > self.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    max_bytes: self.max_bytes,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }
}

/// Retrieves bytes for a guarded target.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fetch the target. The body is returned unread.
    async fn fetch(
        &self,
        target: &ResolvedTarget,
        referer: Option<&str>,
    ) -> Result<FetchOutcome, IngestError>;
}

/// Production fetcher on `reqwest`.
///
/// One client is shared by every request. Its DNS lookups go through
/// [`GuardedResolver`], so a name can only connect to checked addresses.
pub struct HttpFetcher {
    config: FetchConfig,
    guard: UrlGuard,
    resolver: GuardedResolver,
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fetcher resolving names with the system resolver.
    pub fn new(config: FetchConfig, guard: UrlGuard) -> Result<Self, FetchError> {
        Self::with_resolver(config, guard, Arc::new(SystemResolver))
    }

    /// Fetcher resolving names with `resolver`. Every answer is still checked
    /// against `guard`.
    pub fn with_resolver(
        config: FetchConfig,
        guard: UrlGuard,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, FetchError> {
        let resolver = GuardedResolver::new(guard.clone(), resolver);
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .dns_resolver(Arc::new(resolver.clone()))
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FetchError::UpstreamUnreachable(format!("client setup failed: {e}")))?;

        Ok(Self {
            config,
            guard,
            resolver,
            client,
        })
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::UpstreamTimeout {
            timeout_ms: self.config.timeout_ms,
        }
    }

    /// Resolve and check the hop's host before any connection is opened.
    /// Literal IPs were already checked by the guard.
    async fn check_resolution(&self, target: &ResolvedTarget) -> Result<(), IngestError> {
        if target.host().parse::<IpAddr>().is_ok() {
            return Ok(());
        }
        match self.resolver.lookup_checked(target.host()).await {
            Ok(_) => Ok(()),
            Err(LookupError::Blocked(blocked)) => Err(GuardError::from(blocked).into()),
            Err(LookupError::Failed(msg)) => Err(FetchError::UpstreamUnreachable(msg).into()),
        }
    }

    async fn send_hops(
        &self,
        target: &ResolvedTarget,
        referer: Option<&str>,
    ) -> Result<(reqwest::Response, Url), IngestError> {
        let mut current = target.clone();
        let mut redirects = 0usize;

        loop {
            self.check_resolution(&current).await?;

            let mut request = self
                .client
                .get(current.url().clone())
                .header(ACCEPT, ACCEPT_IMAGES);
            if let Some(referer) = referer {
                request = request.header(REFERER, referer);
            }

            tracing::debug!(url = %current.url(), hop = redirects, "Sending upstream request");
            let response = request.send().await.map_err(|e| self.map_send_error(e))?;
            let status = response.status();

            if !matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
                return Ok((response, current.url().clone()));
            }

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .and_then(|location| current.url().join(location.trim()).ok())
                .ok_or(FetchError::UpstreamError {
                    status: status.as_u16(),
                })?;

            if redirects >= self.config.max_redirects {
                return Err(FetchError::TooManyRedirects {
                    limit: self.config.max_redirects,
                }
                .into());
            }
            redirects += 1;

            tracing::debug!(from = %current.url(), to = %next, "Following redirect");
            current = self.guard.resolve_url(next)?;
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> IngestError {
        // A second lookup can answer differently from the first one.
        if let Some(blocked) = find_blocked(&err) {
            return GuardError::from(blocked.clone()).into();
        }
        if err.is_timeout() {
            self.timeout_error().into()
        } else {
            FetchError::UpstreamUnreachable(err.to_string()).into()
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(
        &self,
        target: &ResolvedTarget,
        referer: Option<&str>,
    ) -> Result<FetchOutcome, IngestError> {
        let referer = referer.filter(|r| is_http_url(r));
        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);

        let (response, final_url) =
            tokio::time::timeout_at(deadline, self.send_hops(target, referer))
                .await
                .map_err(|_| self.timeout_error())??;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetchError::UpstreamError { status }.into());
        }

        if let Some(declared) = response.content_length() {
            if declared > self.config.max_bytes {
                return Err(FetchError::PayloadTooLarge {
                    max_bytes: self.config.max_bytes,
                }
                .into());
            }
        }

        let declared_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let timeout_ms = self.config.timeout_ms;
        let chunks = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::UpstreamTimeout { timeout_ms }
                    } else {
                        FetchError::UpstreamUnreachable(e.to_string())
                    }
                })
            })
            .boxed();

        Ok(FetchOutcome {
            status,
            declared_content_type,
            final_url,
            body: FetchBody::from_stream(chunks, self.config.max_bytes)
                .with_deadline(deadline, timeout_ms),
        })
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
