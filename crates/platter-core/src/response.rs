//! Maps a pipeline result to the response handed back to the client.
//!
//! Every failure collapses to the same fallback image so a page never shows a
//! broken image icon, and the body never says why.

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE,
    LOCATION, X_CONTENT_TYPE_OPTIONS,
};
use reqwest::StatusCode;

use crate::config::{ResponseConfig, ResponseMode};
use crate::error::IngestError;
use crate::types::Ingested;

/// Neutral placeholder served for every failure.
pub const FALLBACK_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300">"##,
    r##"<rect width="400" height="300" fill="#f2efe9"/>"##,
    r##"<circle cx="200" cy="150" r="78" fill="#ffffff" stroke="#ddd6ca" stroke-width="6"/>"##,
    r##"<circle cx="200" cy="150" r="52" fill="none" stroke="#ebe5da" stroke-width="3"/>"##,
    r##"</svg>"##
);

pub const FALLBACK_CONTENT_TYPE: &str = "image/svg+xml";

/// Locks the fallback SVG down if it is ever opened directly.
pub const FALLBACK_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

/// Status, headers and body, independent of the server framework.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_fallback(&self) -> bool {
        self.header(CONTENT_TYPE) == Some(FALLBACK_CONTENT_TYPE)
    }
}

/// Turns pipeline results into responses.
#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    config: ResponseConfig,
}

impl ResponsePolicy {
    pub fn new(config: ResponseConfig) -> Self {
        Self { config }
    }

    /// Cache directive for content-addressed assets.
    pub fn asset_cache_control(&self) -> String {
        format!(
            "public, max-age={}, immutable",
            self.config.asset_max_age_secs
        )
    }

    /// Cache directive for the fallback image.
    pub fn fallback_cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.config.fallback_max_age_secs, self.config.fallback_stale_while_revalidate_secs
        )
    }

    pub fn respond(&self, result: &Result<Ingested, IngestError>) -> OutboundResponse {
        match result {
            Ok(ingested) => self.success(ingested),
            Err(_) => self.fallback(),
        }
    }

    fn success(&self, ingested: &Ingested) -> OutboundResponse {
        let mut headers = HeaderMap::new();
        insert(&mut headers, CACHE_CONTROL, &self.asset_cache_control());
        insert(&mut headers, CONTENT_TYPE, &ingested.asset.content_type);

        match self.config.mode {
            ResponseMode::Redirect => match HeaderValue::from_str(&ingested.asset.public_url) {
                Ok(location) => {
                    headers.insert(LOCATION, location);
                    OutboundResponse {
                        status: StatusCode::FOUND,
                        headers,
                        body: Bytes::new(),
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        key = %ingested.asset.storage_key,
                        "Public URL is not a valid header value"
                    );
                    self.fallback()
                }
            },
            ResponseMode::Inline => OutboundResponse {
                status: StatusCode::OK,
                headers,
                body: ingested.content.bytes().clone(),
            },
        }
    }

    /// The fallback image, with its own cache and hardening headers.
    pub fn fallback(&self) -> OutboundResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
        insert(&mut headers, CACHE_CONTROL, &self.fallback_cache_control());
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(FALLBACK_CSP));

        OutboundResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(FALLBACK_SVG.as_bytes()),
        }
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
