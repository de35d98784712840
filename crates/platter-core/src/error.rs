//! Error types for the Platter re-hosting pipeline.
//!
//! Errors are organized by stage. Each stage returns its own typed failure;
//! [`IngestError`] wraps them so the response policy has a single place to
//! turn any failure into the fallback image.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Platter operations outside the request path.
#[derive(Error, Debug)]
pub enum PlatterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store backend could not be set up
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client could not be set up
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// URL normalizer and SSRF guard failures. No fetch is attempted after these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Blocked host: {0}")]
    BlockedHost(String),
}

/// Remote fetch failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream returned HTTP {status}")]
    UpstreamError { status: u16 },

    #[error("Payload too large: more than {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },

    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },
}

/// Content validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("Source looks like a placeholder: {0}")]
    LooksLikePlaceholder(String),
}

/// Durable store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Any failure from any pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Flat failure classification, safe to log and to put in reports.
///
/// Carries no diagnostic detail beyond the kind (and the upstream status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidUrl,
    UnsupportedScheme,
    BlockedHost,
    UpstreamTimeout,
    UpstreamUnreachable,
    UpstreamError,
    PayloadTooLarge,
    TooManyRedirects,
    NotAnImage,
    LooksLikePlaceholder,
    StorageUnavailable,
}

impl FailureKind {
    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::UnsupportedScheme => "unsupported_scheme",
            FailureKind::BlockedHost => "blocked_host",
            FailureKind::UpstreamTimeout => "upstream_timeout",
            FailureKind::UpstreamUnreachable => "upstream_unreachable",
            FailureKind::UpstreamError => "upstream_error",
            FailureKind::PayloadTooLarge => "payload_too_large",
            FailureKind::TooManyRedirects => "too_many_redirects",
            FailureKind::NotAnImage => "not_an_image",
            FailureKind::LooksLikePlaceholder => "looks_like_placeholder",
            FailureKind::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IngestError {
    /// Classify this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Guard(GuardError::InvalidUrl(_)) => FailureKind::InvalidUrl,
            IngestError::Guard(GuardError::UnsupportedScheme(_)) => FailureKind::UnsupportedScheme,
            IngestError::Guard(GuardError::BlockedHost(_)) => FailureKind::BlockedHost,
            IngestError::Fetch(FetchError::UpstreamTimeout { .. }) => FailureKind::UpstreamTimeout,
            IngestError::Fetch(FetchError::UpstreamUnreachable(_)) => {
                FailureKind::UpstreamUnreachable
            }
            IngestError::Fetch(FetchError::UpstreamError { .. }) => FailureKind::UpstreamError,
            IngestError::Fetch(FetchError::PayloadTooLarge { .. }) => FailureKind::PayloadTooLarge,
            IngestError::Fetch(FetchError::TooManyRedirects { .. }) => {
                FailureKind::TooManyRedirects
            }
            IngestError::Validation(ValidationError::NotAnImage(_)) => FailureKind::NotAnImage,
            IngestError::Validation(ValidationError::LooksLikePlaceholder(_)) => {
                FailureKind::LooksLikePlaceholder
            }
            IngestError::Storage(StorageError::StorageUnavailable(_)) => {
                FailureKind::StorageUnavailable
            }
        }
    }

    /// Upstream HTTP status, when the failure came from one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            IngestError::Fetch(FetchError::UpstreamError { status }) => Some(*status),
            _ => None,
        }
    }
}

/// Convenience type alias for Platter results.
pub type Result<T> = std::result::Result<T, PlatterError>;

/// Convenience type alias for request-path results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
