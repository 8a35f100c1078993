use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;

use super::principal::Principal;

pub type SessionToken = String;

const MAX_SESSION_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub principal: Principal,
    pub csrf_token: String,
    pub csrf_issued_at: Instant,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_id() -> Result<String> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("generating session token: {}", e))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

fn ct_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() { return false; }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct SessionManager {
    pub ttl: Duration,
    pub csrf_ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    user_index: RwLock<HashMap<String, HashSet<SessionToken>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(24 * 60 * 60), Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration, csrf_ttl: Duration) -> Self {
        let (ttl, csrf_ttl) = (ttl.min(MAX_SESSION_TTL), csrf_ttl.min(MAX_SESSION_TTL));
        Self { ttl, csrf_ttl, sessions: RwLock::new(HashMap::new()), user_index: RwLock::new(HashMap::new()) }
    }

    /// Mint a session for `principal`. Sessions that expired without being
    /// presented again are pruned here, so abandoned logins do not pile up.
    pub fn issue(&self, principal: Principal) -> Result<Session> {
        self.prune_expired();
        let now = Instant::now();
        let sess = Session {
            session_id: gen_id()?,
            token: gen_id()?,
            principal,
            csrf_token: gen_id()?,
            csrf_issued_at: now,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sess.token.clone(), sess.clone());
        self.user_index.write().entry(sess.principal.user_id.clone()).or_default().insert(sess.token.clone());
        tprintln!("session.issue user={} sid={} ttl_secs={}", sess.principal.user_id, sess.session_id, self.ttl.as_secs());
        Ok(sess)
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionToken> = self.sessions.read().iter().filter(|(_, s)| s.expires_at <= now).map(|(t, _)| t.clone()).collect();
        expired.iter().filter(|t| self.drop_token(t)).count()
    }

    pub fn validate(&self, token: &str) -> Option<Principal> {
        let now = Instant::now();
        {
            let map = self.sessions.read();
            match map.get(token) {
                Some(s) if s.expires_at > now => return Some(s.principal.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.drop_token(token);
        None
    }

    /// Current CSRF token for the session, rotated once it is older than
    /// `csrf_ttl`. `Ok(None)` means the session is gone.
    pub fn csrf_token(&self, token: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut map = self.sessions.write();
        let Some(s) = map.get_mut(token).filter(|s| s.expires_at > now) else { return Ok(None); };
        if now.saturating_duration_since(s.csrf_issued_at) >= self.csrf_ttl {
            s.csrf_token = gen_id()?;
            s.csrf_issued_at = now;
        }
        Ok(Some(s.csrf_token.clone()))
    }

    pub fn validate_csrf(&self, token: &str, provided: &str) -> bool {
        let now = Instant::now();
        let map = self.sessions.read();
        let Some(s) = map.get(token) else { return false; };
        if s.expires_at <= now || now.saturating_duration_since(s.csrf_issued_at) >= self.csrf_ttl { return false; }
        ct_eq(&s.csrf_token, provided)
    }

    fn drop_token(&self, token: &str) -> bool {
        let Some(s) = self.sessions.write().remove(token) else { return false; };
        let mut idx = self.user_index.write();
        if let Some(set) = idx.get_mut(&s.principal.user_id) {
            set.remove(token);
            if set.is_empty() { idx.remove(&s.principal.user_id); }
        }
        true
    }

    pub fn logout(&self, token: &str) -> bool { self.drop_token(token) }

    pub fn revoke_user(&self, user_id: &str) -> usize {
        let tokens = self.user_index.write().remove(user_id).unwrap_or_default();
        let mut s = self.sessions.write();
        let count = tokens.iter().filter(|t| s.remove(t.as_str()).is_some()).count();
        tprintln!("session.revoke user={} count={}", user_id, count);
        count
    }

    pub fn active_sessions(&self) -> usize {
        let now = Instant::now();
        self.sessions.read().values().filter(|s| s.expires_at > now).count()
    }
}
