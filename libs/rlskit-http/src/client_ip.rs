//! Client address resolution.
//!
//! The peer address from `ConnectInfo` is authoritative. `X-Forwarded-For`
//! is only read when that peer is a configured trusted proxy, so a client
//! cannot claim an allow-listed address by sending the header itself.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use ipnet::IpNet;

/// Reverse proxies whose `X-Forwarded-For` header is believed.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    /// No trusted proxies: only the peer address is used.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Proxies given as addresses or CIDR ranges (`"10.0.0.1"`,
    /// `"10.0.0.0/8"`). Entries that parse as neither are logged and
    /// skipped.
    #[must_use]
    pub fn new<I, S>(proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = proxies
            .into_iter()
            .filter_map(|p| {
                let p = p.as_ref().trim();
                let net = p
                    .parse::<IpNet>()
                    .ok()
                    .or_else(|| p.parse::<IpAddr>().ok().map(IpNet::from));
                if net.is_none() {
                    tracing::warn!(proxy = p, "ignoring unparsable trusted proxy");
                }
                net
            })
            .collect();
        Self { networks }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Address of the calling client.
    ///
    /// `None` when the server was not started with connect info.
    #[must_use]
    pub fn client_ip<B>(&self, request: &http::Request<B>) -> Option<IpAddr> {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())?;

        if self.contains(peer)
            && let Some(forwarded) = forwarded_for(request)
        {
            return Some(forwarded);
        }
        Some(peer)
    }
}

/// Leftmost `X-Forwarded-For` entry.
fn forwarded_for<B>(request: &http::Request<B>) -> Option<IpAddr> {
    request
        .headers()
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
