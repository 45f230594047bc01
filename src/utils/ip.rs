//! Client IP resolution for tracking requests
//!
//! `X-Forwarded-For` is honored only when the peer is a configured trusted
//! proxy, or (with no proxies configured) a private/loopback address.

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// 私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

fn parse_peer(peer: &str) -> Option<IpAddr> {
    peer.parse::<SocketAddr>()
        .map(|s| s.ip())
        .or_else(|_| peer.parse::<IpAddr>())
        .ok()
}

/// CIDR 检查，前缀长度非法时返回 false
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let (Ok(prefix), Ok(network)) = (prefix.parse::<u32>(), network.parse::<IpAddr>()) else {
        return false;
    };

    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            (u32::from(*ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            (u128::from(*ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

/// Entries are single IPs or CIDR ranges
pub fn is_trusted_proxy(ip: &IpAddr, trusted_proxies: &[String]) -> bool {
    trusted_proxies.iter().any(|proxy| {
        if proxy.contains('/') {
            ip_in_cidr(ip, proxy)
        } else {
            proxy.parse::<IpAddr>().is_ok_and(|p| p == *ip)
        }
    })
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}

/// Decide between the peer address and the forwarded address
pub fn resolve_client_ip(
    peer: Option<&str>,
    forwarded: Option<String>,
    trusted_proxies: &[String],
) -> Option<String> {
    let Some(peer) = peer else {
        return forwarded;
    };
    let Some(peer_ip) = parse_peer(peer) else {
        return Some(peer.to_string());
    };

    let trust_forwarded = if trusted_proxies.is_empty() {
        is_private_or_local(&peer_ip)
    } else {
        is_trusted_proxy(&peer_ip, trusted_proxies)
    };

    match forwarded {
        Some(real_ip) if trust_forwarded => {
            debug!("Forwarded client ip via {}: {}", peer_ip, real_ip);
            Some(real_ip)
        }
        _ => Some(peer_ip.to_string()),
    }
}

pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    let config = crate::config::get_config();
    let conn = req.connection_info();
    resolve_client_ip(
        conn.peer_addr(),
        forwarded_ip(req.headers()),
        &config.api.trusted_proxies,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_private_or_local() {
        assert!(is_private_or_local(&ip("10.0.0.1")));
        assert!(is_private_or_local(&ip("192.168.1.1")));
        assert!(is_private_or_local(&ip("127.0.0.1")));
        assert!(is_private_or_local(&ip("fd00::1")));
        assert!(is_private_or_local(&ip("fe80::1")));
        assert!(!is_private_or_local(&ip("8.8.8.8")));
        assert!(!is_private_or_local(&ip("2001:4860:4860::8888")));
    }

    #[test]
    fn test_ip_in_cidr() {
        assert!(ip_in_cidr(&ip("192.168.1.100"), "192.168.1.0/24"));
        assert!(!ip_in_cidr(&ip("192.168.2.1"), "192.168.1.0/24"));
        assert!(ip_in_cidr(&ip("2001:db8::1"), "2001:db8::/32"));
        assert!(ip_in_cidr(&ip("1.2.3.4"), "0.0.0.0/0"));
        assert!(!ip_in_cidr(&ip("1.2.3.4"), "1.2.3.0/40"));
        assert!(!ip_in_cidr(&ip("1.2.3.4"), "::/0"));
    }

    #[test]
    fn test_resolve_public_peer_ignores_forwarded() {
        let resolved = resolve_client_ip(Some("203.0.113.5:4000"), Some("1.1.1.1".into()), &[]);
        assert_eq!(resolved.as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_resolve_private_peer_uses_forwarded() {
        let resolved = resolve_client_ip(Some("10.0.0.2:4000"), Some("198.51.100.7".into()), &[]);
        assert_eq!(resolved.as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn test_resolve_with_explicit_trusted_proxies() {
        let proxies = vec!["203.0.113.0/24".to_string()];
        let trusted = resolve_client_ip(Some("203.0.113.9"), Some("198.51.100.7".into()), &proxies);
        assert_eq!(trusted.as_deref(), Some("198.51.100.7"));

        // private but not listed
        let untrusted = resolve_client_ip(Some("10.0.0.2"), Some("198.51.100.7".into()), &proxies);
        assert_eq!(untrusted.as_deref(), Some("10.0.0.2"));
    }
}
