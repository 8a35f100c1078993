use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};

use super::Principal;
use crate::authz::VIEWER;

/// Per-request identity view. The principal is only ever placed in request
/// extensions by the session middleware; nothing here reads a role header.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub client_ip: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Role used for authorization; callers without a principal get the most
    /// restrictive built-in.
    pub fn role(&self) -> &str {
        self.principal.as_ref().map(|p| p.role.as_str()).unwrap_or(VIEWER)
    }

    pub fn user_id(&self) -> Option<&str> { self.principal.as_ref().map(|p| p.user_id.as_str()) }

    pub fn actor(&self) -> &str { self.user_id().unwrap_or("anonymous") }
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`, else the peer address.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty());
    if let Some(xff) = header("x-forwarded-for") {
        let first = xff.split(',').next().unwrap_or(xff).trim();
        if !first.is_empty() { return Some(first.to_string()); }
    }
    if let Some(xri) = header("x-real-ip") { return Some(xri.to_string()); }
    extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            principal: parts.extensions.get::<Principal>().cloned(),
            client_ip: client_ip(&parts.headers, &parts.extensions),
            request_id: parts.headers.get("x-request-id").and_then(|v| v.to_str().ok()).map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        h.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&h, &Extensions::new()).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn real_ip_then_peer() {
        let mut h = HeaderMap::new();
        h.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&h, &Extensions::new()).as_deref(), Some("10.0.0.9"));

        let mut ext = Extensions::new();
        ext.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 40000))));
        assert_eq!(client_ip(&HeaderMap::new(), &ext).as_deref(), Some("192.168.1.5"));
        assert!(client_ip(&HeaderMap::new(), &Extensions::new()).is_none());
    }

    #[test]
    fn missing_principal_defaults_to_viewer() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.role(), "viewer");
        assert_eq!(ctx.actor(), "anonymous");
        let ctx = RequestContext { principal: Some(Principal::new("alice", "admin")), ..Default::default() };
        assert_eq!(ctx.role(), "admin");
    }
}
