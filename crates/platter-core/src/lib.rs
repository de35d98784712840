//! Platter Core - remote image ingestion and re-hosting.
//!
//! Model output references images by URL. Platter takes such a URL, fetches
//! it without exposing the network it runs in, checks that the bytes really
//! are an image, and stores them under a content-derived key. Callers get a
//! durable, cacheable URL back, or a neutral placeholder when anything fails.
//!
//! # Architecture
//!
//! ```text
//! URL → Guard → Placeholder check → Fetch (capped) → Validate → Store → Response
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use platter_core::{Config, ImageRequest, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> platter_core::Result<()> {
//!     let config = Config::load()?;
//!     let ingestor = Ingestor::from_config(&config)?;
//!
//!     let report = ingestor
//!         .report(&ImageRequest::new("https://cdn.example.com/dish.jpg"))
//!         .await;
//!     println!("{:?}", report.asset.map(|a| a.public_url));
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod response;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    ConfigError, FailureKind, FetchError, GuardError, IngestError, IngestResult, PlatterError,
    Result, StorageError, ValidationError,
};
pub use output::{BatchSummary, OutputFormat, OutputWriter};
pub use pipeline::{Fetcher, HttpFetcher, Ingestor, UrlGuard};
pub use response::{OutboundResponse, ResponsePolicy};
pub use store::{BlobStore, ContentStore, FilesystemStore, HttpStore, MemoryStore};
pub use types::{ImageRequest, ImageType, IngestReport, IngestStatus, Ingested, StoredAsset};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
