//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// URL normalizer and SSRF guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Longest accepted raw URL, in characters
    pub max_url_length: usize,

    /// Paths of our own image proxy; URLs pointing at them are unwrapped once
    pub proxy_paths: Vec<String>,

    /// Query parameters that carry the wrapped URL on a proxy path
    pub proxy_params: Vec<String>,

    /// Disable host and resolved-IP blocking.
    /// Only for local development against loopback fixtures.
    pub allow_private_hosts: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_url_length: 2048,
            proxy_paths: vec!["/image".to_string(), "/api/image".to_string()],
            proxy_params: vec!["target".to_string(), "url".to_string()],
            allow_private_hosts: false,
        }
    }
}

/// Remote fetch bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Wall-clock budget for the whole fetch (all hops, headers and body)
    pub timeout_ms: u64,

    /// Maximum number of redirects followed
    pub max_redirects: usize,

    /// Hard cap on received body bytes
    pub max_bytes: u64,

    /// Fixed User-Agent sent upstream
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 12_000,
            max_redirects: 5,
            max_bytes: 8 * 1024 * 1024,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Content validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject sources whose URL matches a known placeholder pattern
    pub reject_placeholders: bool,

    /// Hosts (and their subdomains) that only serve stock or dummy images
    pub placeholder_hosts: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reject_placeholders: true,
            placeholder_hosts: [
                "placeholder.com",
                "placehold.co",
                "placehold.it",
                "dummyimage.com",
                "picsum.photos",
                "loremflickr.com",
                "lorempixel.com",
                "source.unsplash.com",
                "fakeimg.pl",
                "placekitten.com",
                "placebear.com",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        }
    }
}

/// Which durable store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local directory, served by `platter serve` under `/images/`
    #[default]
    Filesystem,
    /// Remote object endpoint accepting authenticated PUTs
    Http,
    /// In-process map; contents are lost on exit
    Memory,
}

/// Durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend
    pub backend: StorageBackend,

    /// Write timeout in milliseconds
    pub timeout_ms: u64,

    /// Filesystem backend settings
    pub filesystem: FilesystemStoreConfig,

    /// HTTP backend settings
    pub http: Option<HttpStoreConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            timeout_ms: 15_000,
            filesystem: FilesystemStoreConfig::default(),
            http: None,
        }
    }
}

/// Filesystem backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemStoreConfig {
    /// Root directory; keys are created beneath it (supports `~`)
    pub root: PathBuf,

    /// Base URL the stored keys are publicly reachable under
    pub public_base_url: String,
}

impl Default for FilesystemStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/.platter/store"),
            public_base_url: "http://127.0.0.1:8787".to_string(),
        }
    }
}

/// HTTP object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStoreConfig {
    /// Write endpoint; objects are PUT to `<endpoint>/<key>`
    pub endpoint: String,

    /// Public base URL; objects are read from `<public_base_url>/<key>`
    pub public_base_url: String,

    /// Write token (supports ${ENV_VAR} syntax)
    pub token: String,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            public_base_url: String::new(),
            token: "${PLATTER_BLOB_TOKEN}".to_string(),
        }
    }
}

/// How a successfully stored image is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// 302 to the durable public URL
    #[default]
    Redirect,
    /// Stream the validated bytes directly
    Inline,
}

/// Response policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Redirect or inline delivery for stored assets
    pub mode: ResponseMode,

    /// `max-age` for content-addressed assets
    pub asset_max_age_secs: u64,

    /// `max-age` for the fallback placeholder
    pub fallback_max_age_secs: u64,

    /// `stale-while-revalidate` for the fallback placeholder
    pub fallback_stale_while_revalidate_secs: u64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            mode: ResponseMode::Redirect,
            asset_max_age_secs: 31_536_000,
            fallback_max_age_secs: 86_400,
            fallback_stale_while_revalidate_secs: 604_800,
        }
    }
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
