//! Login front door over HTTP: throttling, lockout, sessions and CSRF.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, Method, Request, StatusCode};

use clustergate::config::GateConfig;
use clustergate::store::MemoryStore;
use common::{authed, empty, harness, harness_with, login, login_request, send, test_config, with_json};

#[tokio::test]
async fn fifth_failure_blocks_address_even_for_correct_password() {
    let h = harness();
    let ip = "203.0.113.50";
    for attempt in 1..=5 {
        let (status, _, _) = send(&h.app, login_request("alice", "wrong", ip)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {}", attempt);
    }
    let (status, _, body) = send(&h.app, login_request("alice", "alice-pw", ip)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "address_blocked");
    // another address is unaffected
    let (status, _, _) = send(&h.app, login_request("alice", "alice-pw", "203.0.113.51")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.audit.with_action("login_failed").len(), 5);
    assert_eq!(h.audit.with_action("login_blocked").len(), 1);
}

#[tokio::test]
async fn success_resets_address_counter() {
    let h = harness();
    let ip = "203.0.113.60";
    for _ in 0..4 {
        send(&h.app, login_request("alice", "wrong", ip)).await;
    }
    assert_eq!(h.state.bruteforce.failure_count(ip), 4);
    let (status, _, _) = send(&h.app, login_request("alice", "alice-pw", ip)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.state.bruteforce.failure_count(ip), 0);
    assert_eq!(h.state.lockout.failure_count("alice"), 0);
}

#[tokio::test]
async fn account_locks_across_rotating_addresses() {
    let h = harness();
    for i in 0..10 {
        let (status, _, _) = send(&h.app, login_request("bob", "wrong", &format!("10.2.0.{}", i))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, body) = send(&h.app, login_request("bob", "bob-pw", "10.2.9.9")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "account_locked");
    // a different account from a shared address is not penalized
    let (status, _, _) = send(&h.app, login_request("alice", "alice-pw", "10.2.0.1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_returns_session_and_cookie() {
    let h = harness();
    let (status, headers, body) = send(&h.app, login_request("Alice", "alice-pw", "198.51.100.7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "user");
    let cookie = headers.get(header::SET_COOKIE).and_then(|v| v.to_str().ok()).expect("cookie");
    assert!(cookie.starts_with("clustergate_session="));
    assert!(cookie.contains("HttpOnly"));

    let token = body["token"].as_str().expect("token");
    let (status, _, me) = send(&h.app, empty(authed(Method::GET, "/api/auth/me", token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "user");
    assert_eq!(me["features"]["settings_admin"], false);
}

#[tokio::test]
async fn anonymous_callers_are_rejected_and_default_to_viewer_permissions() {
    let h = harness();
    let (status, _, _) = send(&h.app, empty(Request::builder().uri("/api/roles"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, body) = send(&h.app, empty(Request::builder().uri("/api/auth/permissions"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "viewer");
    assert_eq!(body["features"]["dashboard"], true);
    assert_eq!(body["features"]["terminal"], false);
    let (status, _, _) = send(&h.app, empty(Request::builder().uri("/healthz"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cookie_sessions_need_csrf_for_writes() {
    let h = harness();
    let (_, _, body) = send(&h.app, login_request("alice", "alice-pw", "198.51.100.8")).await;
    let token = body["token"].as_str().expect("token").to_string();
    let csrf = body["csrf_token"].as_str().expect("csrf").to_string();
    let cookie = format!("clustergate_session={}", token);

    let req = with_json(
        Request::builder().method(Method::POST).uri("/api/access/request").header(header::COOKIE, &cookie),
        &serde_json::json!({"action": "delete", "resource": "pods", "namespace": "default"}),
    );
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "invalid_csrf");

    let (status, _, fetched) = send(&h.app, empty(Request::builder().uri("/api/auth/csrf-token").header(header::COOKIE, &cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["csrf_token"], csrf.as_str());

    let req = with_json(
        Request::builder().method(Method::POST).uri("/api/access/request").header(header::COOKIE, &cookie).header("x-csrf-token", &csrf),
        &serde_json::json!({"action": "delete", "resource": "pods", "namespace": "default"}),
    );
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::CREATED);

    // bearer callers skip the CSRF check
    let req = with_json(authed(Method::POST, "/api/access/request", &token), &serde_json::json!({"action": "logs", "resource": "pods"}));
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let h = harness();
    let token = login(&h, "victor", "victor-pw").await;
    let (status, _, _) = send(&h.app, empty(authed(Method::POST, "/api/auth/logout", &token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&h.app, empty(authed(Method::GET, "/api/auth/me", &token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_logins_stall_the_next_attempt() {
    let cfg = GateConfig { ip_delays_ms: vec![0, 0, 60, 120, 180], ..test_config() };
    let h = harness_with(cfg, Arc::new(MemoryStore::default()));
    let ip = "203.0.113.70";
    let mut elapsed = Vec::new();
    for _ in 0..4 {
        let started = Instant::now();
        let (status, _, _) = send(&h.app, login_request("alice", "wrong", ip)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        elapsed.push(started.elapsed());
    }
    // attempts 1 and 2 follow zero or one failure and are not stalled
    assert!(elapsed[0] < Duration::from_millis(60), "{:?}", elapsed);
    assert!(elapsed[2] >= Duration::from_millis(60), "{:?}", elapsed);
    assert!(elapsed[3] >= Duration::from_millis(120), "{:?}", elapsed);
}

#[tokio::test]
async fn untrusted_forwarding_headers_cannot_dodge_the_address_block() {
    let cfg = GateConfig { trust_proxy_headers: false, ..test_config() };
    let h = harness_with(cfg, Arc::new(MemoryStore::default()));
    for i in 0..5 {
        let (status, _, _) = send(&h.app, login_request("alice", "wrong", &format!("198.18.0.{}", i))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, body) = send(&h.app, login_request("alice", "alice-pw", "198.18.0.99")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "address_blocked");
}
