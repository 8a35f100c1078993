//! Request gates, outermost first: `authenticate` resolves the session,
//! `csrf_guard` protects cookie-authenticated writes, `require_session`
//! rejects anonymous callers, then `feature_gate` / `resource_gate` apply
//! the role checks for individual routes.

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use crate::audit::AuditRecord;
use crate::authz::{Action, Feature};
use crate::error::AppError;
use crate::identity::{Principal, RequestContext};

use super::{AppState, SESSION_COOKIE};

/// How the caller presented their session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Cookie,
    Bearer,
}

/// Session token resolved by [`authenticate`]; present only for live sessions.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    pub token: String,
    pub method: AuthMethod,
}

/// Why a resource gate let the request through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Role,
    AccessRequest,
}

pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let s = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            if k == name && !v.is_empty() { return Some(v.to_string()); }
        }
    }
    None
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = v.split_once(' ')?;
    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty()).then(|| token.trim().to_string())
}

/// Attach the session's [`Principal`] and [`SessionAuth`] to the request when
/// a valid bearer token or session cookie is presented. Never rejects.
/// Forwarding headers are stripped first unless the proxy is trusted.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !state.trust_proxy_headers {
        req.headers_mut().remove("x-forwarded-for");
        req.headers_mut().remove("x-real-ip");
    }
    let presented = bearer_token(req.headers())
        .map(|t| (t, AuthMethod::Bearer))
        .or_else(|| parse_cookie(req.headers(), SESSION_COOKIE).map(|t| (t, AuthMethod::Cookie)));
    if let Some((token, method)) = presented {
        if let Some(principal) = state.sessions.validate(&token) {
            req.extensions_mut().insert(principal);
            req.extensions_mut().insert(SessionAuth { token, method });
        }
    }
    next.run(req).await
}

/// State-changing requests that rely on the session cookie must echo the
/// session's CSRF token in `x-csrf-token`. Bearer callers are exempt.
pub async fn csrf_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let safe = matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if !safe {
        if let Some(auth) = req.extensions().get::<SessionAuth>() {
            if auth.method == AuthMethod::Cookie {
                let provided = req.headers().get("x-csrf-token").and_then(|v| v.to_str().ok()).unwrap_or("");
                if !state.sessions.validate_csrf(&auth.token, provided) {
                    debug!(target: "auth", "csrf check failed for {} {}", req.method(), req.uri().path());
                    return AppError::csrf("invalid_csrf", "missing or invalid CSRF token").into_response();
                }
            }
        }
    }
    next.run(req).await
}

pub async fn require_session(ctx: RequestContext, req: Request, next: Next) -> Response {
    if ctx.principal.is_none() {
        return AppError::auth("unauthenticated", "authentication required").into_response();
    }
    next.run(req).await
}

#[derive(Clone)]
pub struct FeatureGate {
    pub state: AppState,
    pub feature: Feature,
}

pub async fn feature_gate(State(gate): State<FeatureGate>, ctx: RequestContext, req: Request, next: Next) -> Response {
    let role = ctx.role();
    if !gate.state.authorizer.is_feature_allowed(role, gate.feature.as_str()) {
        let reason = format!("role '{}' cannot use feature '{}'", role, gate.feature);
        gate.state.audit.record(
            &AuditRecord::new(ctx.actor(), "feature_denied", "deny")
                .resource(gate.feature.as_str(), "")
                .reason(&reason)
                .client_ip(ctx.client_ip.clone()),
        );
        return AppError::forbidden("feature_denied", reason).into_response();
    }
    next.run(req).await
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
    pub ns: Option<String>,
}

impl NamespaceQuery {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().or(self.ns.as_deref()).unwrap_or("")
    }
}

/// Resource/action check for `/{resource}/{action}` routes. A denial can
/// still pass if the caller holds an approved access request for the exact
/// tuple; both outcomes are audited.
pub async fn resource_gate(
    State(state): State<AppState>,
    Path((resource, action)): Path<(String, String)>,
    Query(q): Query<NamespaceQuery>,
    ctx: RequestContext,
    mut req: Request,
    next: Next,
) -> Response {
    let namespace = q.namespace().to_string();
    let role = ctx.role().to_string();
    let decision = state.authorizer.is_allowed(&role, &resource, &action, &namespace);
    if decision.allow {
        req.extensions_mut().insert(Grant::Role);
        return next.run(req).await;
    }

    let elevated = match (ctx.principal.as_ref(), action.parse::<Action>()) {
        (Some(Principal { user_id, .. }), Ok(act)) => state.access.is_approved(user_id, &resource, act, &namespace),
        _ => false,
    };
    if elevated {
        state.audit.record(
            &AuditRecord::new(ctx.actor(), "access_request_used", "allow")
                .resource(&resource, &namespace)
                .reason(format!("{} permitted by approved access request ({})", action, decision.reason))
                .client_ip(ctx.client_ip.clone()),
        );
        req.extensions_mut().insert(Grant::AccessRequest);
        return next.run(req).await;
    }

    state.audit.record(
        &AuditRecord::new(ctx.actor(), "authz_denied", "deny")
            .resource(&resource, &namespace)
            .reason(&decision.reason)
            .client_ip(ctx.client_ip.clone()),
    );
    AppError::forbidden("authz_denied", decision.reason).into_response()
}
