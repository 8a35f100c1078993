//!
//! clustergate HTTP server
//! -----------------------
//! Axum router for the console's trust-and-access layer.
//!
//! Responsibilities:
//! - Login/logout with a session cookie (or bearer token) and per-session CSRF token.
//! - Per-address throttling and per-account lockout around every credential check.
//! - Role management, feature-permission introspection and access-request review.
//! - Feature and resource gates placed in front of delegated cluster operations.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{any, get, post, put};
use axum::Router;
use tracing::{info, warn};

use crate::access::AccessRequestManager;
use crate::audit::{AuditSink, FanoutAuditSink, FileAuditSink, TracingAuditSink};
use crate::authz::{Authorizer, Feature, ADMIN};
use crate::config::GateConfig;
use crate::guard::{AccountLockout, BruteForceProtector};
use crate::identity::{CredentialVerifier, LocalCredentials, SessionManager};
use crate::store::{JsonFileStore, MemoryStore, PolicyStore};

pub mod auth;
pub mod roles;
pub mod access;
pub mod middleware;

use middleware::{authenticate, csrf_guard, feature_gate, require_session, resource_gate, FeatureGate};

pub const SESSION_COOKIE: &str = "clustergate_session";

/// Shared handles for every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub access: Arc<AccessRequestManager>,
    pub bruteforce: Arc<BruteForceProtector>,
    pub lockout: Arc<AccountLockout>,
    pub sessions: Arc<SessionManager>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub audit: Arc<dyn AuditSink>,
    pub secure_cookies: bool,
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire every component from configuration and restore persisted roles
    /// and access requests from `store`.
    pub fn new(cfg: &GateConfig, store: Arc<dyn PolicyStore>, credentials: Arc<dyn CredentialVerifier>, audit: Arc<dyn AuditSink>) -> anyhow::Result<Self> {
        let authorizer = Authorizer::with_persisted_roles(store.clone()).context("loading custom roles")?;
        let access = AccessRequestManager::new(cfg.access_request_ttl(), store, audit.clone());
        let restored = access.load_persisted().context("loading access requests")?;
        if restored > 0 { info!(target: "startup", "restored {} access request(s)", restored); }
        Ok(Self {
            authorizer: Arc::new(authorizer),
            access: Arc::new(access),
            bruteforce: Arc::new(BruteForceProtector::new(cfg.brute_force_policy())),
            lockout: Arc::new(AccountLockout::new(cfg.lockout_policy())),
            sessions: Arc::new(SessionManager::new(cfg.session_ttl(), cfg.csrf_ttl())),
            credentials,
            audit,
            secure_cookies: cfg.secure_cookies,
            trust_proxy_headers: cfg.trust_proxy_headers,
        })
    }

    /// Halt both background sweeps. Safe to call more than once.
    pub fn shutdown(&self) {
        self.bruteforce.stop();
        self.lockout.stop();
    }

    fn gate(&self, feature: Feature) -> FeatureGate {
        FeatureGate { state: self.clone(), feature }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_gate = || from_fn_with_state(state.gate(Feature::SettingsAdmin), feature_gate);
    let security_gate = || from_fn_with_state(state.gate(Feature::SettingsSecurity), feature_gate);

    let public = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/permissions", get(auth::permissions));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/csrf-token", get(auth::csrf_token))
        .route("/api/auth/me", get(auth::me))
        .route("/api/roles", get(roles::list_roles).merge(post(roles::create_role).route_layer(admin_gate())))
        .route(
            "/api/roles/{name}",
            get(roles::get_role).merge(put(roles::update_role).delete(roles::delete_role).route_layer(admin_gate())),
        )
        .route("/api/access/request", post(access::create_request))
        .route("/api/access/requests", get(access::list_requests))
        .route("/api/access/approve/{id}", post(access::approve_request).route_layer(security_gate()))
        .route("/api/access/deny/{id}", post(access::deny_request).route_layer(security_gate()))
        .route(
            "/api/cluster/{resource}/{action}",
            any(access::cluster_operation).layer(from_fn_with_state(state.clone(), resource_gate)),
        )
        .route_layer(from_fn(require_session));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), csrf_guard))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}

fn random_password() -> anyhow::Result<String> {
    use base64::Engine;
    let mut buf = [0u8; 18];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!("generating admin password: {}", e))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Start the HTTP server and block until Ctrl-C.
pub async fn run(cfg: GateConfig) -> anyhow::Result<()> {
    let store: Arc<dyn PolicyStore> = match cfg.data_dir.as_ref() {
        Some(dir) => {
            info!(target: "startup", "persisting roles and access requests under {}", dir.display());
            Arc::new(JsonFileStore::open(dir)?)
        }
        None => {
            warn!(target: "startup", "no data directory configured; custom roles and access requests are kept in memory only");
            Arc::new(MemoryStore::default())
        }
    };

    let mut fanout = FanoutAuditSink::new(vec![Arc::new(TracingAuditSink)]);
    if let Some(path) = cfg.audit_log.as_ref() {
        info!(target: "startup", "audit log: {}", path.display());
        fanout.push(Arc::new(FileAuditSink::new(path)));
    }
    let audit: Arc<dyn AuditSink> = Arc::new(fanout);

    let credentials = LocalCredentials::new();
    let admin_password = match cfg.admin_password.clone() {
        Some(p) => p,
        None => {
            let p = random_password()?;
            warn!(target: "startup", "no admin password configured; generated one for '{}': {}", cfg.admin_user, p);
            p
        }
    };
    credentials.add_user(&cfg.admin_user, &admin_password, ADMIN).context("seeding bootstrap admin")?;

    let state = AppState::new(&cfg, store, Arc::new(credentials), audit)?;
    let app = build_router(state.clone());

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "startup", "shutdown requested");
        })
        .await?;

    state.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_admin_passwords_are_random() -> anyhow::Result<()> {
        let (a, b) = (random_password()?, random_password()?);
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
        assert_ne!(a, "A".repeat(24));
        Ok(())
    }
}
