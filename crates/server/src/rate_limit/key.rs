//! Default rate limit key: the client address.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use http::request::Parts;

/// Key used when no client address can be determined.
pub(super) const UNKNOWN_CLIENT: &str = "unknown";

/// Client address of the request as a string key.
///
/// Proxy headers are only consulted when `trust_proxy_headers` is set, since any
/// client can send them.
pub(super) fn client_key(parts: &Parts, trust_proxy_headers: bool) -> String {
    client_ip(parts, trust_proxy_headers)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn client_ip(parts: &Parts, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers && let Some(ip) = forwarded_ip(parts) {
        return Some(ip);
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(parts: &Parts) -> Option<IpAddr> {
    // First address of the chain is the original client.
    let forwarded_for = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    forwarded_for.or_else(|| {
        parts
            .headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}
