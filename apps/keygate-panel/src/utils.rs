use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Caller address. Forwarding headers are honoured only when the socket peer
/// is one of `trusted_proxies`: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer itself. Unparseable header values are skipped.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trusted_proxies: &[IpAddr]) -> IpAddr {
    if !trusted_proxies.contains(&peer.ip()) {
        return peer.ip();
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.5:41000".parse().unwrap()
    }

    fn proxies() -> Vec<IpAddr> {
        vec![peer().ip()]
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            client_ip(&headers, peer(), &proxies()),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn falls_back_to_real_ip_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            client_ip(&headers, peer(), &proxies()),
            "198.51.100.2".parse::<IpAddr>().unwrap()
        );

        assert_eq!(client_ip(&HeaderMap::new(), peer(), &proxies()), peer().ip());
    }

    #[test]
    fn headers_from_untrusted_peers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));

        let direct: SocketAddr = "203.0.113.7:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, direct, &proxies()), direct.ip());
        assert_eq!(client_ip(&headers, peer(), &[]), peer().ip());
    }
}
