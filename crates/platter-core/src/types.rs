//! Core data types flowing through the re-hosting pipeline.
//!
//! Each stage owns its output until it is handed to the next stage. Nothing
//! here is mutated after construction.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FailureKind, IngestError};

/// One inbound request to re-host a remote image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// URL exactly as found in model output
    pub raw_url: String,

    /// Referer to present upstream, only when the caller supplied one
    pub referer_hint: Option<String>,
}

impl ImageRequest {
    pub fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            referer_hint: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        let referer = referer.into();
        self.referer_hint = if referer.trim().is_empty() {
            None
        } else {
            Some(referer)
        };
        self
    }
}

/// Allowed URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// A URL that passed the guard. Only the guard constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub(crate) scheme: Scheme,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) url: Url,
}

impl ResolvedTarget {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host as parsed (IPv6 literals without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Normalized URL that will be requested.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Image types the pipeline accepts.
///
/// SVG is deliberately absent: it can carry script and is never re-hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Png,
    Jpeg,
    Webp,
    Gif,
    Avif,
}

impl ImageType {
    /// Parse a declared MIME type. Parameters and case are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            "image/avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Map a file extension (without dot) to an image type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Avif => "avif",
        }
    }
}

/// Bytes that passed the size cap and the type checks.
#[derive(Debug, Clone)]
pub struct ValidatedAsset {
    pub(crate) bytes: Bytes,
    pub(crate) content_type: ImageType,
    pub(crate) source_url: Url,
}

impl ValidatedAsset {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> ImageType {
        self.content_type
    }

    pub fn byte_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Final URL the bytes were served from (after redirects).
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }
}

/// A durably stored, content-addressed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAsset {
    /// BLAKE3 hex digest of the bytes
    pub content_hash: String,

    /// File extension used in the key
    pub extension: String,

    /// `images/<hash>.<extension>`
    pub storage_key: String,

    /// Durable public URL returned by the backend
    pub public_url: String,

    /// Stored size in bytes
    pub byte_length: u64,

    /// MIME type stored alongside the object
    pub content_type: String,
}

/// A successful pass through the pipeline.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub asset: StoredAsset,
    pub content: ValidatedAsset,
}

/// Outcome of a single URL, as reported by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Stored,
    Failed,
}

/// Serializable per-URL result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// URL as supplied
    pub source_url: String,

    pub status: IngestStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<StoredAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Upstream HTTP status for `upstream_error` failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,

    /// Wall-clock time spent in the pipeline
    pub latency_ms: u64,
}

impl IngestReport {
    pub fn from_result(
        source_url: &str,
        result: &Result<Ingested, IngestError>,
        latency_ms: u64,
    ) -> Self {
        match result {
            Ok(ingested) => Self {
                source_url: source_url.to_string(),
                status: IngestStatus::Stored,
                asset: Some(ingested.asset.clone()),
                failure: None,
                upstream_status: None,
                latency_ms,
            },
            Err(e) => Self {
                source_url: source_url.to_string(),
                status: IngestStatus::Failed,
                asset: None,
                failure: Some(e.kind()),
                upstream_status: e.upstream_status(),
                latency_ms,
            },
        }
    }

    pub fn is_stored(&self) -> bool {
        self.status == IngestStatus::Stored
    }
}
