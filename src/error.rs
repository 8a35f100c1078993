//! Unified application error model and mapping helpers.
//! This module provides the caller-facing error enum used by the HTTP surface
//! and the authorization/elevation components, along with the status mapping
//! the boundary layer relies on to tell conflict, forbidden, not-found and
//! bad-request apart.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::access::AccessRequestError;
use crate::authz::RoleError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Csrf { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    TooManyRequests { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Csrf { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::TooManyRequests { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Csrf { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::TooManyRequests { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn csrf<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Csrf { code: code.into(), message: msg.into() } }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn too_many<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::TooManyRequests { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Csrf { .. } => 403,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::TooManyRequests { .. } => 429,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<RoleError> for AppError {
    fn from(err: RoleError) -> Self {
        let msg = err.to_string();
        match err {
            RoleError::EmptyName => AppError::user("role_name_required", msg),
            RoleError::Conflict(_) => AppError::conflict("role_builtin_conflict", msg),
            RoleError::BuiltIn(_) => AppError::forbidden("role_builtin", msg),
            RoleError::NotFound(_) => AppError::not_found("role_not_found", msg),
            RoleError::Persist(_) => AppError::internal("role_persist_failed", msg),
        }
    }
}

impl From<AccessRequestError> for AppError {
    fn from(err: AccessRequestError) -> Self {
        let msg = err.to_string();
        match err {
            AccessRequestError::NotFound(_) => AppError::not_found("access_request_not_found", msg),
            AccessRequestError::SelfReview => AppError::forbidden("access_request_self_review", msg),
            AccessRequestError::AlreadyResolved { .. } => AppError::conflict("access_request_resolved", msg),
            AccessRequestError::Expired(_) => AppError::user("access_request_expired", msg),
            AccessRequestError::Persist(_) => AppError::internal("access_request_persist_failed", msg),
        }
    }
}
