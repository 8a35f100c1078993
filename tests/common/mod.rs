#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use clustergate::audit::MemoryAuditSink;
use clustergate::config::GateConfig;
use clustergate::identity::CredentialVerifier;
use clustergate::server::{build_router, AppState};
use clustergate::store::{MemoryStore, PolicyStore};

/// Plain-text accounts so HTTP tests don't pay for Argon2 on every login.
#[derive(Default)]
pub struct StaticCredentials {
    accounts: HashMap<String, (String, String)>,
}

impl StaticCredentials {
    pub fn with(mut self, user: &str, password: &str, role: &str) -> Self {
        self.accounts.insert(user.to_string(), (password.to_string(), role.to_string()));
        self
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> anyhow::Result<Option<String>> {
        Ok(self.accounts.get(username).filter(|(p, _)| p == password).map(|(_, r)| r.clone()))
    }
}

pub fn test_config() -> GateConfig {
    GateConfig {
        ip_delays_ms: vec![0, 0, 1, 2, 3],
        secure_cookies: false,
        ..GateConfig::default()
    }
}

pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub audit: Arc<MemoryAuditSink>,
    pub store: Arc<dyn PolicyStore>,
}

pub fn default_accounts() -> StaticCredentials {
    StaticCredentials::default()
        .with("admin", "admin-pw", "admin")
        .with("alice", "alice-pw", "user")
        .with("bob", "bob-pw", "user")
        .with("victor", "victor-pw", "viewer")
}

pub fn harness() -> Harness {
    harness_with(test_config(), Arc::new(MemoryStore::default()))
}

pub fn harness_with(cfg: GateConfig, store: Arc<dyn PolicyStore>) -> Harness {
    let audit = Arc::new(MemoryAuditSink::default());
    let state = AppState::new(&cfg, store.clone(), Arc::new(default_accounts()), audit.clone()).expect("state");
    Harness { app: build_router(state.clone()), state, audit, store }
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() { return serde_json::Value::Null; }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string()))
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let headers = resp.headers().clone();
    (status, headers, read_json(resp).await)
}

pub fn with_json(builder: axum::http::request::Builder, body: &serde_json::Value) -> Request<Body> {
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).expect("request")
}

pub fn login_request(user: &str, password: &str, ip: &str) -> Request<Body> {
    with_json(
        Request::builder().method(Method::POST).uri("/api/auth/login").header("x-forwarded-for", ip),
        &serde_json::json!({"username": user, "password": password}),
    )
}

/// Log in and return the bearer token.
pub async fn login(h: &Harness, user: &str, password: &str) -> String {
    let (status, _, body) = send(&h.app, login_request(user, password, "198.51.100.1")).await;
    assert_eq!(status, StatusCode::OK, "login for {} failed: {}", user, body);
    body["token"].as_str().expect("token").to_string()
}

pub fn authed(method: Method, uri: &str, token: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri).header(header::AUTHORIZATION, format!("Bearer {}", token))
}
