//! URL normalization and SSRF guard.
//!
//! Pure validation, no I/O. The same host predicate is reused by the fetcher
//! for the post-DNS check on every hop, so literal hosts and resolved
//! addresses are held to one blocklist:
//! - scheme must be `http` or `https`
//! - loopback, link-local, private, unspecified, CGNAT, multicast and
//!   reserved ranges (IPv4 and IPv6, including IPv4-mapped forms)
//! - `localhost`, `*.localhost`, `*.local`, `*.internal`, dotless names
//!
//! Numeric host spellings (`0x7f.1`, `2130706433`) are canonicalized by the
//! WHATWG parser before the check, so they cannot slip past it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::types::{ResolvedTarget, Scheme};

/// Hostnames that always point inside the deployment.
const BLOCKED_NAMES: &[&str] = &["localhost", "metadata", "instance-data"];

/// Domain suffixes that never leave the local network.
const BLOCKED_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal", ".home.arpa"];

/// Base used to parse relative proxy links (`/image?target=...`).
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Validates candidate URLs before anything touches the network.
#[derive(Debug, Clone)]
pub struct UrlGuard {
    config: GuardConfig,
}

impl UrlGuard {
    /// Create a guard with the given settings.
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Validate a raw URL from model output.
    ///
    /// Unwraps at most one level of proxy nesting or percent-encoding; anything
    /// still wrapped after that is rejected.
    pub fn resolve(&self, raw_url: &str) -> Result<ResolvedTarget, GuardError> {
        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return Err(GuardError::InvalidUrl("empty URL".to_string()));
        }
        self.check_length(trimmed)?;

        let candidate = match self.unwrap_once(trimmed) {
            Some(inner) => {
                if self.unwrap_once(&inner).is_some() {
                    return Err(GuardError::InvalidUrl("nested proxy URL".to_string()));
                }
                tracing::debug!("Unwrapped proxied URL one level");
                inner
            }
            None => trimmed.to_string(),
        };
        self.check_length(&candidate)?;

        let url = parse_absolute(&candidate)?;
        self.resolve_url(url)
    }

    /// Validate an already-parsed absolute URL (used for redirect hops).
    pub fn resolve_url(&self, mut url: Url) -> Result<ResolvedTarget, GuardError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(GuardError::UnsupportedScheme(other.to_string())),
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(GuardError::InvalidUrl(
                "credentials in URL are not allowed".to_string(),
            ));
        }

        let (host, rewrite) = match url.host() {
            None => return Err(GuardError::InvalidUrl("URL has no host".to_string())),
            Some(Host::Ipv4(v4)) => {
                self.check_ip(IpAddr::V4(v4))?;
                (v4.to_string(), false)
            }
            Some(Host::Ipv6(v6)) => {
                self.check_ip(IpAddr::V6(v6))?;
                (v6.to_string(), false)
            }
            Some(Host::Domain(domain)) => {
                let name = domain.trim_end_matches('.').to_ascii_lowercase();
                if name.is_empty() {
                    return Err(GuardError::InvalidUrl("URL has an empty host".to_string()));
                }
                self.check_name(&name)?;
                let rewrite = name != domain;
                (name, rewrite)
            }
        };

        // The requested URL must carry exactly the host that was checked.
        if rewrite {
            url.set_host(Some(&host))
                .map_err(|e| GuardError::InvalidUrl(e.to_string()))?;
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| GuardError::InvalidUrl("URL has no port".to_string()))?;

        url.set_fragment(None);

        Ok(ResolvedTarget {
            scheme,
            host,
            port,
            url,
        })
    }

    /// Reject addresses inside the blocked ranges.
    ///
    /// Shared with the fetcher for the post-resolution check.
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), GuardError> {
        if self.config.allow_private_hosts {
            return Ok(());
        }
        if is_blocked_ip(ip) {
            return Err(GuardError::BlockedHost(ip.to_string()));
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), GuardError> {
        if self.config.allow_private_hosts {
            return Ok(());
        }
        if is_blocked_name(name) {
            return Err(GuardError::BlockedHost(name.to_string()));
        }
        Ok(())
    }

    fn check_length(&self, url: &str) -> Result<(), GuardError> {
        if url.len() > self.config.max_url_length {
            return Err(GuardError::InvalidUrl(format!(
                "URL too long: {} chars (max {})",
                url.len(),
                self.config.max_url_length
            )));
        }
        Ok(())
    }

    /// Peel one layer of wrapping, if there is one.
    ///
    /// Two shapes count as wrapped: a percent-encoded absolute URL, and a link
    /// to one of our own proxy paths carrying the real URL in a query param.
    fn unwrap_once(&self, input: &str) -> Option<String> {
        if looks_percent_encoded(input) {
            return urlencoding::decode(input)
                .ok()
                .map(|decoded| decoded.trim().to_string());
        }

        let parsed = if input.starts_with('/') && !input.starts_with("//") {
            Url::parse(RELATIVE_BASE).ok()?.join(input).ok()?
        } else {
            parse_absolute(input).ok()?
        };

        let path = parsed.path().trim_end_matches('/');
        if !self.config.proxy_paths.iter().any(|p| p.trim_end_matches('/') == path) {
            return None;
        }

        parsed
            .query_pairs()
            .find(|(key, _)| self.config.proxy_params.iter().any(|p| p == key.as_ref()))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Parse an absolute URL; protocol-relative input is upgraded to https.
fn parse_absolute(input: &str) -> Result<Url, GuardError> {
    let owned;
    let input = if input.starts_with("//") {
        owned = format!("https:{input}");
        owned.as_str()
    } else {
        input
    };
    Url::parse(input).map_err(|e| GuardError::InvalidUrl(e.to_string()))
}

fn looks_percent_encoded(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    lower.starts_with("http%3a") || lower.starts_with("https%3a") || lower.starts_with("%2f%2f")
}

fn is_blocked_name(name: &str) -> bool {
    if BLOCKED_NAMES.contains(&name) {
        return true;
    }
    if BLOCKED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return true;
    }
    // Single-label names resolve through the local search domain.
    !name.contains('.')
}

/// Whether an address falls inside any range the pipeline must never reach.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || o[0] == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (o[0] == 100 && (o[1] & 0xC0) == 64)
        // 192.0.0.0/24 IETF protocol assignments
        || (o[0] == 192 && o[1] == 0 && o[2] == 0)
        // 198.18.0.0/15 benchmarking
        || (o[0] == 198 && (o[1] & 0xFE) == 18)
        // 240.0.0.0/4 reserved
        || o[0] >= 240
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }

    let seg = ip.segments();
    // fc00::/7 unique local
    if (seg[0] & 0xFE00) == 0xFC00 {
        return true;
    }
    // fe80::/10 link-local, fec0::/10 deprecated site-local
    if (seg[0] & 0xFFC0) == 0xFE80 || (seg[0] & 0xFFC0) == 0xFEC0 {
        return true;
    }

    // ::ffff:a.b.c.d and ::a.b.c.d
    if let Some(v4) = ip.to_ipv4() {
        return is_blocked_ipv4(v4);
    }
    // 64:ff9b::/96 NAT64 embeds an IPv4 address in the last 32 bits
    if seg[0] == 0x0064 && seg[1] == 0xFF9B && seg[2..6].iter().all(|s| *s == 0) {
        let o = ip.octets();
        return is_blocked_ipv4(Ipv4Addr::new(o[12], o[13], o[14], o[15]));
    }
    // 2002::/16 6to4 embeds an IPv4 address in bits 16..48
    if seg[0] == 0x2002 {
        let o = ip.octets();
        return is_blocked_ipv4(Ipv4Addr::new(o[2], o[3], o[4], o[5]));
    }

    false
}
