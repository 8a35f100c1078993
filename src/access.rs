//! Time-boxed access elevation.
//!
//! A caller asks for one (action, resource, namespace) tuple beyond their
//! role; a different identity approves or denies it exactly once. Expiry is
//! never swept: every decision and every `is_approved` call re-checks the
//! stored deadline, so a late approval cannot race a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::authz::Action;
use crate::store::PolicyStore;

pub const DEFAULT_ACCESS_REQUEST_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessRequestState {
    Pending,
    Approved,
    Denied,
}

impl std::fmt::Display for AccessRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AccessRequestState::Pending => "pending",
            AccessRequestState::Approved => "approved",
            AccessRequestState::Denied => "denied",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRequest {
    pub id: String,
    pub requester: String,
    pub action: Action,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub justification: String,
    pub state: AccessRequestState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }
    pub fn is_expired(&self) -> bool { self.is_expired_at(Utc::now()) }
}

#[derive(Debug, Error)]
pub enum AccessRequestError {
    #[error("access request not found: {0}")]
    NotFound(String),
    #[error("access request has expired: {0}")]
    Expired(String),
    #[error("access request is not pending: {id} (current state: {state})")]
    AlreadyResolved { id: String, state: AccessRequestState },
    #[error("cannot review your own access request")]
    SelfReview,
    #[error("failed to persist access request: {0}")]
    Persist(String),
}

pub struct AccessRequestManager {
    requests: RwLock<HashMap<String, AccessRequest>>,
    ttl: chrono::Duration,
    store: Arc<dyn PolicyStore>,
    audit: Arc<dyn AuditSink>,
}

fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("ar-{}", &id[..20])
}

impl AccessRequestManager {
    pub fn new(ttl: Duration, store: Arc<dyn PolicyStore>, audit: Arc<dyn AuditSink>) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_ACCESS_REQUEST_TTL } else { ttl };
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { requests: RwLock::new(HashMap::new()), ttl, store, audit }
    }

    /// Restore previously persisted requests. Expired ones are kept; they
    /// simply never satisfy `is_approved`.
    pub fn load_persisted(&self) -> anyhow::Result<usize> {
        let loaded = self.store.load_access_requests()?;
        let n = loaded.len();
        let mut map = self.requests.write();
        for r in loaded { map.insert(r.id.clone(), r); }
        Ok(n)
    }

    pub fn ttl(&self) -> chrono::Duration { self.ttl }

    /// Best-effort write used only on creation, which cannot fail; a lost
    /// pending record merely disappears on restart and grants nothing.
    fn persist(&self, req: &AccessRequest) {
        if let Err(e) = self.store.save_access_request(req) {
            warn!(target: "access", "failed to persist access request {}: {}", req.id, e);
        }
    }

    pub fn create_request(&self, requester: &str, action: Action, resource: &str, namespace: &str, justification: &str) -> String {
        let now = Utc::now();
        let req = AccessRequest {
            id: new_request_id(),
            requester: requester.to_string(),
            action,
            resource: resource.to_string(),
            namespace: namespace.to_string(),
            justification: justification.to_string(),
            state: AccessRequestState::Pending,
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            reviewed_by: None,
            review_note: None,
            reviewed_at: None,
        };
        let id = req.id.clone();
        self.requests.write().insert(id.clone(), req.clone());
        self.persist(&req);
        info!(target: "access", "access request {} created by {}: {} {} in '{}'", id, requester, action, resource, namespace);
        self.audit.record(
            &AuditRecord::new(requester, "access_request_created", "pending")
                .resource(resource, namespace)
                .reason(format!("requested {}: {}", action, justification))
                .request_id(&id),
        );
        id
    }

    pub fn approve_request(&self, id: &str, reviewer: &str, note: &str) -> Result<(), AccessRequestError> {
        self.resolve(id, reviewer, note, AccessRequestState::Approved)
    }

    pub fn deny_request(&self, id: &str, reviewer: &str, note: &str) -> Result<(), AccessRequestError> {
        self.resolve(id, reviewer, note, AccessRequestState::Denied)
    }

    fn resolve(&self, id: &str, reviewer: &str, note: &str, to: AccessRequestState) -> Result<(), AccessRequestError> {
        let now = Utc::now();
        let updated = {
            let mut map = self.requests.write();
            let req = map.get(id).ok_or_else(|| AccessRequestError::NotFound(id.to_string()))?;
            if req.state != AccessRequestState::Pending {
                return Err(AccessRequestError::AlreadyResolved { id: id.to_string(), state: req.state });
            }
            if req.is_expired_at(now) { return Err(AccessRequestError::Expired(id.to_string())); }
            if req.requester == reviewer { return Err(AccessRequestError::SelfReview); }
            let mut next = req.clone();
            next.state = to;
            next.reviewed_by = Some(reviewer.to_string());
            next.review_note = if note.is_empty() { None } else { Some(note.to_string()) };
            next.reviewed_at = Some(now);
            // the decision only takes effect once it is durable
            self.store.save_access_request(&next).map_err(|e| {
                warn!(target: "access", "failed to persist review of access request {}: {}", id, e);
                AccessRequestError::Persist(e.to_string())
            })?;
            map.insert(id.to_string(), next.clone());
            next
        };
        let (action, decision) = match to {
            AccessRequestState::Approved => ("access_request_approved", "approved"),
            _ => ("access_request_denied", "denied"),
        };
        info!(target: "access", "access request {} {} by {} for {}", id, decision, reviewer, updated.requester);
        self.audit.record(
            &AuditRecord::new(reviewer, action, decision)
                .resource(&updated.resource, &updated.namespace)
                .reason(format!("{} {} for {}: {}", decision, updated.action, updated.requester, note))
                .request_id(id),
        );
        Ok(())
    }

    /// True iff an approved, unexpired request exists for exactly this tuple.
    pub fn is_approved(&self, requester: &str, resource: &str, action: Action, namespace: &str) -> bool {
        let now = Utc::now();
        self.requests.read().values().any(|r| {
            r.state == AccessRequestState::Approved
                && !r.is_expired_at(now)
                && r.requester == requester
                && r.action == action
                && r.resource == resource
                && r.namespace == namespace
        })
    }

    /// Every request still pending, oldest first, including ones past their deadline.
    pub fn get_pending_requests(&self) -> Vec<AccessRequest> {
        let mut out: Vec<AccessRequest> = self.requests.read().values().filter(|r| r.state == AccessRequestState::Pending).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn get_request(&self, id: &str) -> Option<AccessRequest> { self.requests.read().get(id).cloned() }

    pub fn list_requests(&self) -> Vec<AccessRequest> {
        let mut out: Vec<AccessRequest> = self.requests.read().values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}
