//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod origin;

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use platter_core::config::{Config, StorageBackend};
use platter_core::pipeline::{HostResolver, HttpFetcher, UrlGuard};
use platter_core::{BlobStore, ContentStore, Ingestor, MemoryStore};

pub const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

pub const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
    b'R',
];

pub const PUBLIC_BASE: &str = "https://cdn.example.com";

/// Config that can reach the loopback origin, with small limits.
pub fn loopback_config() -> Config {
    let mut config = Config::default();
    config.guard.allow_private_hosts = true;
    config.fetch.timeout_ms = 2_000;
    config.fetch.max_bytes = 64 * 1024;
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Production fetcher over an in-memory store.
pub fn ingestor(config: &Config) -> (Ingestor, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let ingestor = with_store(config, memory.clone());
    (ingestor, memory)
}

pub fn with_store(config: &Config, backend: Arc<dyn BlobStore>) -> Ingestor {
    let fetcher = Arc::new(
        HttpFetcher::new(config.fetch.clone(), UrlGuard::new(config.guard.clone())).unwrap(),
    );
    let store = ContentStore::new(backend, config.storage.timeout_ms);
    Ingestor::new(config, fetcher, store)
}

/// Resolver with canned answers. A host given several answers returns them in
/// order, then keeps repeating the last one.
#[derive(Default)]
pub struct FixedResolver {
    answers: Mutex<HashMap<String, Vec<Vec<IpAddr>>>>,
    lookups: AtomicUsize,
}

impl FixedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, host: &str, ips: &[&str]) -> Self {
        let ips = ips.iter().map(|ip| ip.parse().unwrap()).collect();
        self.answers
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .push(ips);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for FixedResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        let queue = answers
            .get_mut(host)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown host"))?;
        if queue.len() > 1 {
            Ok(queue.remove(0))
        } else {
            Ok(queue[0].clone())
        }
    }
}
