//! Client identity resolution.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;

/// Key shared by every request whose origin cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the key a request is counted under.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` entry wins.
/// Otherwise the peer IP is used, falling back to [`UNKNOWN_CLIENT`].
pub fn client_key<B>(request: &Request<B>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = forwarded_for(request) {
            return forwarded;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_for<B>(request: &Request<B>) -> Option<String> {
    let value = request.headers().get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<()> {
        Request::builder().uri("/").body(()).unwrap()
    }

    fn with_peer(mut request: Request<()>, addr: &str) -> Request<()> {
        let addr: SocketAddr = addr.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_peer_address_used() {
        let request = with_peer(request(), "192.168.1.7:51234");
        assert_eq!(client_key(&request, false), "192.168.1.7");
    }

    #[test]
    fn test_ipv6_peer_address() {
        let request = with_peer(request(), "[::1]:8080");
        assert_eq!(client_key(&request, false), "::1");
    }

    #[test]
    fn test_missing_peer_falls_back_to_unknown() {
        assert_eq!(client_key(&request(), false), UNKNOWN_CLIENT);
        assert_eq!(client_key(&request(), true), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let mut request = with_peer(request(), "10.0.0.1:1000");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, "203.0.113.5".parse().unwrap());
        assert_eq!(client_key(&request, false), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_for_first_entry_when_trusted() {
        let mut request = with_peer(request(), "10.0.0.1:1000");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, " 203.0.113.5 , 10.0.0.2".parse().unwrap());
        assert_eq!(client_key(&request, true), "203.0.113.5");
    }

    #[test]
    fn test_blank_forwarded_for_falls_through() {
        let mut request = with_peer(request(), "10.0.0.1:1000");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, " , 10.0.0.2".parse().unwrap());
        assert_eq!(client_key(&request, true), "10.0.0.1");
    }
}
