//! Login front door: throttle and lockout checks wrap every credential check,
//! and a successful login mints the session consulted on later requests.

use axum::extract::{Extension, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::audit::AuditRecord;
use crate::error::{AppError, AppResult};
use crate::guard::Throttle;
use crate::identity::{Attrs, Principal, RequestContext};

use super::middleware::SessionAuth;
use super::{AppState, SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

fn session_cookie(sid: &str, secure: bool) -> AppResult<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly{}; SameSite=Strict; Path=/", SESSION_COOKIE, sid, secure))
        .map_err(|e| AppError::internal("cookie_encode_failed", e.to_string()))
}

fn clear_session_cookie(secure: bool) -> AppResult<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly{}; SameSite=Strict; Path=/", SESSION_COOKIE, secure))
        .map_err(|e| AppError::internal("cookie_encode_failed", e.to_string()))
}

pub async fn login(State(state): State<AppState>, ctx: RequestContext, Json(payload): Json<LoginPayload>) -> AppResult<Response> {
    let ip = ctx.client_ip.clone().unwrap_or_else(|| "unknown".to_string());
    let account = payload.username.trim().to_ascii_lowercase();
    if account.is_empty() {
        return Err(AppError::user("username_required", "username is required"));
    }

    if state.bruteforce.is_blocked(&ip) {
        state.audit.record(&AuditRecord::new(&account, "login_blocked", "deny").reason("address temporarily blocked").client_ip(Some(ip.clone())));
        return Err(AppError::too_many("address_blocked", "too many failed login attempts from this address; try again later"));
    }
    if state.lockout.is_locked(&account) {
        state.audit.record(&AuditRecord::new(&account, "login_locked", "deny").reason("account temporarily locked").client_ip(Some(ip.clone())));
        return Err(AppError::too_many("account_locked", "account temporarily locked after repeated failed logins"));
    }

    // progressive stall before the credential check
    let delay = state.bruteforce.delay_for(&ip);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let verified = state.credentials.verify(&account, &payload.password).map_err(|e| {
        error!(target: "auth", "credential backend error: {e}");
        AppError::internal("auth_backend_error", "credential check failed")
    })?;

    let Some(role) = verified else {
        let throttle = state.bruteforce.record_failure(&ip);
        let locked = state.lockout.record_failure(&account);
        let reason = match (throttle, locked) {
            (_, true) => "invalid credentials; account locked".to_string(),
            (Throttle::Blocked, _) => "invalid credentials; address blocked".to_string(),
            (Throttle::Delay(d), _) => format!("invalid credentials; next attempt delayed {:?}", d),
        };
        state.audit.record(&AuditRecord::new(&account, "login_failed", "deny").reason(reason).client_ip(Some(ip.clone())));
        return Err(AppError::auth("invalid_credentials", "invalid username or password"));
    };

    state.bruteforce.record_success(&ip);
    state.lockout.record_success(&account);

    let principal = Principal {
        user_id: account.clone(),
        role: role.clone(),
        attrs: Attrs { ip: Some(ip.clone()), auth_method: Some("password".into()) },
    };
    let session = state.sessions.issue(principal).map_err(|e| {
        error!(target: "auth", "session issue failed: {e}");
        AppError::internal("session_issue_failed", "could not create session")
    })?;
    info!(target: "auth", "login ok user={} role={} ip={}", account, role, ip);
    state.audit.record(&AuditRecord::new(&account, "login_succeeded", "allow").client_ip(Some(ip)));

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&session.token, state.secure_cookies)?);
    let body = serde_json::json!({
        "status": "ok",
        "token": session.token,
        "username": account,
        "role": role,
        "csrf_token": session.csrf_token,
        "expires_in_secs": state.sessions.ttl.as_secs(),
    });
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

pub async fn logout(State(state): State<AppState>, Extension(auth): Extension<SessionAuth>, ctx: RequestContext) -> AppResult<Response> {
    state.sessions.logout(&auth.token);
    state.audit.record(&AuditRecord::new(ctx.actor(), "logout", "allow").client_ip(ctx.client_ip.clone()));
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, clear_session_cookie(state.secure_cookies)?);
    Ok((StatusCode::OK, headers, Json(serde_json::json!({"status":"ok"}))).into_response())
}

pub async fn csrf_token(State(state): State<AppState>, Extension(auth): Extension<SessionAuth>) -> AppResult<Json<serde_json::Value>> {
    let token = state.sessions.csrf_token(&auth.token)
        .map_err(|e| AppError::internal("csrf_issue_failed", e.to_string()))?
        .ok_or_else(|| AppError::auth("session_expired", "session expired"))?;
    Ok(Json(serde_json::json!({"status":"ok","csrf_token": token})))
}

pub async fn me(State(state): State<AppState>, ctx: RequestContext) -> Json<serde_json::Value> {
    let role = ctx.role().to_string();
    Json(serde_json::json!({
        "username": ctx.user_id(),
        "role": role,
        "features": state.authorizer.feature_permissions(&role),
    }))
}

/// Feature map for the caller's role. Drives UI affordances only; every
/// operation is still checked server-side.
pub async fn permissions(State(state): State<AppState>, ctx: RequestContext) -> Json<serde_json::Value> {
    let role = ctx.role().to_string();
    Json(serde_json::json!({
        "role": role,
        "features": state.authorizer.feature_permissions(&role),
    }))
}
