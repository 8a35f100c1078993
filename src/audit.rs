//! Structured audit records and the sinks that receive them.
//!
//! Sinks are fire-and-forget: a write failure is swallowed so an audit
//! outage can never block an authorization decision.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    pub decision: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_request_id: Option<String>,
}

impl AuditRecord {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, decision: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            resource: String::new(),
            namespace: String::new(),
            decision: decision.into(),
            reason: String::new(),
            client_ip: None,
            access_request_id: None,
        }
    }

    pub fn resource(mut self, resource: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.resource = resource.into();
        self.namespace = namespace.into();
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self { self.reason = reason.into(); self }

    pub fn client_ip(mut self, ip: Option<String>) -> Self { self.client_ip = ip; self }

    pub fn request_id(mut self, id: impl Into<String>) -> Self { self.access_request_id = Some(id.into()); self }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, rec: &AuditRecord);
}

/// Emits every record as a structured `tracing` event under the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, rec: &AuditRecord) {
        info!(
            target: "audit",
            actor = %rec.actor,
            action = %rec.action,
            resource = %rec.resource,
            namespace = %rec.namespace,
            decision = %rec.decision,
            client_ip = rec.client_ip.as_deref().unwrap_or(""),
            request_id = rec.access_request_id.as_deref().unwrap_or(""),
            "{}", rec.reason
        );
    }
}

/// Appends compact JSON lines to a file; I/O errors are ignored.
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), lock: Mutex::new(()) } }
}

impl AuditSink for FileAuditSink {
    fn record(&self, rec: &AuditRecord) {
        let Ok(line) = serde_json::to_string(rec) else { return; };
        let _g = self.lock.lock();
        if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(&mut f, "{}", line);
        }
    }
}

/// Keeps records in memory; useful for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> { self.records.read().clone() }
    pub fn with_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records.read().iter().filter(|r| r.action == action).cloned().collect()
    }
    pub fn clear(&self) { self.records.write().clear(); }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, rec: &AuditRecord) { self.records.write().push(rec.clone()); }
}

#[derive(Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self { Self { sinks } }
    pub fn push(&mut self, sink: Arc<dyn AuditSink>) { self.sinks.push(sink); }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, rec: &AuditRecord) {
        for s in self.sinks.iter() { s.record(rec); }
    }
}
