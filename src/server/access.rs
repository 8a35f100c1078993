//! Access-request endpoints and the gated cluster-operation endpoint.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::access::AccessRequestState;
use crate::authz::Action;
use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;

use super::middleware::{Grant, NamespaceQuery};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAccessRequest {
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, alias = "reason")]
    pub justification: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewPayload {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
}

fn reviewer(ctx: &RequestContext) -> AppResult<String> {
    ctx.user_id().map(|s| s.to_string()).ok_or_else(|| AppError::auth("unauthenticated", "authentication required"))
}

pub async fn create_request(State(state): State<AppState>, ctx: RequestContext, Json(req): Json<CreateAccessRequest>) -> AppResult<Response> {
    let requester = reviewer(&ctx)?;
    let action: Action = req.action.parse().map_err(|e: String| AppError::user("invalid_action", e))?;
    if req.resource.trim().is_empty() {
        return Err(AppError::user("resource_required", "resource is required"));
    }
    let id = state.access.create_request(&requester, action, req.resource.trim(), req.namespace.trim(), &req.justification);
    let created = state.access.get_request(&id);
    Ok((StatusCode::CREATED, Json(serde_json::json!({
        "status": "pending",
        "id": id,
        "expires_at": created.map(|r| r.expires_at),
    }))).into_response())
}

/// Pending requests by default; `?state=all` lists every request.
pub async fn list_requests(State(state): State<AppState>, Query(q): Query<ListQuery>) -> AppResult<Json<serde_json::Value>> {
    let requests = match q.state.as_deref().map(|s| s.to_ascii_lowercase()) {
        None => state.access.get_pending_requests(),
        Some(s) if s == "pending" => state.access.get_pending_requests(),
        Some(s) if s == "all" => state.access.list_requests(),
        Some(s) => {
            let wanted = match s.as_str() {
                "approved" => AccessRequestState::Approved,
                "denied" => AccessRequestState::Denied,
                other => return Err(AppError::user("invalid_state", format!("unknown state filter: {}", other))),
            };
            state.access.list_requests().into_iter().filter(|r| r.state == wanted).collect()
        }
    };
    Ok(Json(serde_json::json!({ "total": requests.len(), "requests": requests })))
}

fn review_note(body: &Bytes) -> AppResult<String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) { return Ok(String::new()); }
    let p: ReviewPayload = serde_json::from_slice(body).map_err(|e| AppError::user("invalid_body", e.to_string()))?;
    Ok(p.note)
}

pub async fn approve_request(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<String>, body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let who = reviewer(&ctx)?;
    let note = review_note(&body)?;
    state.access.approve_request(&id, &who, &note)?;
    Ok(Json(serde_json::json!({"status":"approved","id": id})))
}

pub async fn deny_request(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<String>, body: Bytes) -> AppResult<Json<serde_json::Value>> {
    let who = reviewer(&ctx)?;
    let note = review_note(&body)?;
    state.access.deny_request(&id, &who, &note)?;
    Ok(Json(serde_json::json!({"status":"denied","id": id})))
}

/// Reached only after `resource_gate` admitted the call; the cluster client
/// that performs the operation lives outside this service.
pub async fn cluster_operation(
    Path((resource, action)): Path<(String, String)>,
    Query(q): Query<NamespaceQuery>,
    Extension(grant): Extension<Grant>,
    ctx: RequestContext,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "authorized",
        "user": ctx.user_id(),
        "resource": resource,
        "action": action,
        "namespace": q.namespace(),
        "via": match grant { Grant::Role => "role", Grant::AccessRequest => "access_request" },
    }))
}
