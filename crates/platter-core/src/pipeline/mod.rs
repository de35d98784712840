//! Image re-hosting pipeline components.
//!
//! Stages, in order:
//! - **guard**: URL normalization and SSRF blocking
//! - **validate**: placeholder heuristic before the fetch, type checks after
//! - **resolve**: DNS answers checked against the guard's blocked ranges
//! - **fetch**: bounded remote fetch with per-hop re-checks
//! - **hash**: content hashing and storage keys
//! - **processor**: orchestrates the full pipeline

pub mod fetch;
pub mod guard;
pub mod hash;
pub mod processor;
pub mod resolve;
pub mod validate;

// Re-exports for convenient access
pub use fetch::{FetchBody, FetchOutcome, Fetcher, HttpFetcher};
pub use guard::UrlGuard;
pub use hash::Hasher;
pub use processor::Ingestor;
pub use resolve::{GuardedResolver, HostResolver, SystemResolver};
pub use validate::Validator;
