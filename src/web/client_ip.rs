//! Client address resolution behind reverse proxies.

use axum::http::HeaderMap;
use std::collections::HashSet;
use std::net::IpAddr;

/// Header a trusted proxy records the original client in.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Peers whose `X-Forwarded-For` header is believed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    proxies: HashSet<IpAddr>,
}

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            proxies: proxies.into_iter().collect(),
        }
    }

    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        self.proxies.contains(&peer)
    }

    /// The address a request should be attributed to.
    ///
    /// Only a trusted peer's header is consulted, and only its first hop.
    /// A trusted peer sending an unusable header is an error rather than a
    /// fallback to the peer, which would attribute the request to the proxy.
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> Result<IpAddr, String> {
        if !self.is_trusted(peer) {
            return Ok(peer);
        }

        let forwarded = match headers.get(FORWARDED_FOR) {
            Some(value) => value
                .to_str()
                .map_err(|_| "unreadable X-Forwarded-For header".to_string())?,
            None => return Ok(peer),
        };

        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if first.is_empty() {
            return Ok(peer);
        }

        first
            .parse()
            .map_err(|_| format!("invalid X-Forwarded-For address: {}", first))
    }
}
