//! Role-management API. Mutations are gated on the `settings_admin` feature
//! and always refuse the built-in role names.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::audit::AuditRecord;
use crate::authz::{ResourceRule, RoleDefinition};
use crate::error::{AppError, AppResult};
use crate::identity::RequestContext;

use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoleRequest {
    pub name: String,
    pub description: String,
    pub allow: Vec<ResourceRule>,
    pub deny: Vec<ResourceRule>,
    pub allowed_features: Vec<String>,
    pub denied_features: Vec<String>,
}

impl RoleRequest {
    fn into_role(self, name: String) -> RoleDefinition {
        RoleDefinition {
            name,
            description: self.description,
            allow: self.allow,
            deny: self.deny,
            allowed_features: self.allowed_features,
            denied_features: self.denied_features,
            is_custom: true,
        }
    }
}

pub async fn list_roles(State(state): State<AppState>) -> Json<serde_json::Value> {
    let roles = state.authorizer.list_roles();
    Json(serde_json::json!({ "total": roles.len(), "roles": roles }))
}

pub async fn get_role(State(state): State<AppState>, Path(name): Path<String>) -> AppResult<Json<RoleDefinition>> {
    state.authorizer.get_role(&name).map(Json).ok_or_else(|| AppError::not_found("role_not_found", format!("role not found: {}", name)))
}

pub async fn create_role(State(state): State<AppState>, ctx: RequestContext, Json(req): Json<RoleRequest>) -> AppResult<Response> {
    let name = req.name.clone();
    let role = state.authorizer.create_custom_role(req.into_role(name))?;
    state.audit.record(&AuditRecord::new(ctx.actor(), "role_created", "allow").resource(format!("role/{}", role.name), "").client_ip(ctx.client_ip.clone()));
    Ok((StatusCode::CREATED, Json(serde_json::json!({"status":"created","name": role.name}))).into_response())
}

pub async fn update_role(State(state): State<AppState>, ctx: RequestContext, Path(name): Path<String>, Json(req): Json<RoleRequest>) -> AppResult<Json<serde_json::Value>> {
    let role = state.authorizer.update_custom_role(&name, req.into_role(name.clone()))?;
    state.audit.record(&AuditRecord::new(ctx.actor(), "role_updated", "allow").resource(format!("role/{}", role.name), "").client_ip(ctx.client_ip.clone()));
    Ok(Json(serde_json::json!({"status":"updated","name": role.name})))
}

pub async fn delete_role(State(state): State<AppState>, ctx: RequestContext, Path(name): Path<String>) -> AppResult<Json<serde_json::Value>> {
    state.authorizer.delete_role(&name).map_err(AppError::from)?;
    state.audit.record(&AuditRecord::new(ctx.actor(), "role_deleted", "allow").resource(format!("role/{}", name), "").client_ip(ctx.client_ip.clone()));
    Ok(Json(serde_json::json!({"status":"deleted","name": name})))
}
