//! Name resolution for the fetcher.
//!
//! Every address the HTTP client may connect to comes from
//! [`GuardedResolver`], which drops the whole answer if any address is in a
//! blocked range. The check runs inside the client's own lookup, so the
//! connection always goes to an address that was checked, whatever host
//! spelling the request carries.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use crate::error::GuardError;
use crate::pipeline::guard::UrlGuard;

/// Source of DNS answers.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system resolver, via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// A resolved name that pointed into a blocked range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedAddress {
    pub host: String,
    pub ip: IpAddr,
}

impl fmt::Display for BlockedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resolved to blocked address {}", self.host, self.ip)
    }
}

impl std::error::Error for BlockedAddress {}

/// Why a checked lookup failed.
#[derive(Debug)]
pub enum LookupError {
    Blocked(BlockedAddress),
    Failed(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Blocked(blocked) => blocked.fmt(f),
            LookupError::Failed(msg) => f.write_str(msg),
        }
    }
}

impl From<BlockedAddress> for GuardError {
    fn from(blocked: BlockedAddress) -> Self {
        GuardError::BlockedHost(blocked.host)
    }
}

/// Resolver that runs every answer through [`UrlGuard::check_ip`].
#[derive(Clone)]
pub struct GuardedResolver {
    guard: UrlGuard,
    inner: Arc<dyn HostResolver>,
}

impl GuardedResolver {
    pub fn new(guard: UrlGuard, inner: Arc<dyn HostResolver>) -> Self {
        Self { guard, inner }
    }

    /// Resolve `host` and check every address. Fails closed on the first
    /// blocked address and on an empty answer.
    pub async fn lookup_checked(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let host = host.trim_end_matches('.');
        let ips = self
            .inner
            .lookup(host)
            .await
            .map_err(|e| LookupError::Failed(format!("{host}: {e}")))?;

        if ips.is_empty() {
            return Err(LookupError::Failed(format!("no addresses for {host}")));
        }
        for &ip in &ips {
            if self.guard.check_ip(ip).is_err() {
                tracing::warn!(host = %host, ip = %ip, "Host resolved to a blocked address");
                return Err(LookupError::Blocked(BlockedAddress {
                    host: host.to_string(),
                    ip,
                }));
            }
        }
        Ok(ips)
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            match resolver.lookup_checked(name.as_str()).await {
                Ok(ips) => {
                    // The connector fills in the port from the request URL.
                    let addrs: Addrs =
                        Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                    Ok(addrs)
                }
                Err(LookupError::Blocked(blocked)) => Err(blocked.into()),
                Err(LookupError::Failed(msg)) => {
                    Err(io::Error::new(io::ErrorKind::NotFound, msg).into())
                }
            }
        })
    }
}

/// Whether `err` (or anything in its source chain) is a blocked lookup.
pub fn find_blocked<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a BlockedAddress> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(blocked) = e.downcast_ref::<BlockedAddress>() {
            return Some(blocked);
        }
        current = e.source();
    }
    None
}
