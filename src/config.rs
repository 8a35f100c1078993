//! Runtime configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional JSON
//! file (`--config PATH` or `CLUSTERGATE_CONFIG`), `CLUSTERGATE_*` environment
//! variables, then command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::guard::{BruteForcePolicy, LockoutPolicy};

pub const ENV_PREFIX: &str = "CLUSTERGATE_";

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub http_port: u16,
    /// Directory for persisted roles and access requests; in-memory when unset.
    pub data_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub session_ttl_secs: u64,
    pub csrf_ttl_secs: u64,
    pub max_ip_failures: u32,
    pub ip_block_secs: u64,
    /// Stall per failure count, in milliseconds; index 0 is unused.
    pub ip_delays_ms: Vec<u64>,
    pub lockout_threshold: u32,
    pub lockout_secs: u64,
    pub sweep_interval_secs: u64,
    pub access_request_ttl_secs: u64,
    pub admin_user: String,
    pub admin_password: Option<String>,
    pub secure_cookies: bool,
    /// Honour `X-Forwarded-For` / `X-Real-IP`. Disable when not behind a proxy
    /// that overwrites them, or clients can pick their own address.
    pub trust_proxy_headers: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            data_dir: None,
            audit_log: None,
            session_ttl_secs: 24 * 60 * 60,
            csrf_ttl_secs: 60 * 60,
            max_ip_failures: 5,
            ip_block_secs: 15 * 60,
            ip_delays_ms: vec![0, 0, 1_000, 3_000, 5_000],
            lockout_threshold: 10,
            lockout_secs: 30 * 60,
            sweep_interval_secs: 5 * 60,
            access_request_ttl_secs: 30 * 60,
            admin_user: "admin".into(),
            admin_password: None,
            secure_cookies: true,
            trust_proxy_headers: true,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(|s| s.as_str());
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(v);
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_num<T: std::str::FromStr>(what: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| anyhow::anyhow!("invalid value for {}: '{}' ({})", what, raw, e))
}

fn parse_delays(what: &str, raw: &str) -> Result<Vec<u64>> {
    raw.split(',').filter(|s| !s.trim().is_empty()).map(|s| parse_num::<u64>(what, s)).collect()
}

impl GateConfig {
    /// Resolve configuration from process arguments and environment.
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        Self::resolve(args, |k| std::env::var(k).ok())
    }

    /// Same as [`GateConfig::from_env_and_args`] with an injectable environment lookup.
    pub fn resolve(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| env(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        let file = arg_value(args, "--config").map(|s| s.to_string()).or_else(|| var("CONFIG"));
        let mut cfg = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        // environment
        if let Some(v) = var("HTTP_PORT") { cfg.http_port = parse_num("CLUSTERGATE_HTTP_PORT", &v)?; }
        if let Some(v) = var("DATA_DIR") { cfg.data_dir = Some(PathBuf::from(v)); }
        if let Some(v) = var("AUDIT_LOG") { cfg.audit_log = Some(PathBuf::from(v)); }
        if let Some(v) = var("SESSION_TTL_SECS") { cfg.session_ttl_secs = parse_num("CLUSTERGATE_SESSION_TTL_SECS", &v)?; }
        if let Some(v) = var("CSRF_TTL_SECS") { cfg.csrf_ttl_secs = parse_num("CLUSTERGATE_CSRF_TTL_SECS", &v)?; }
        if let Some(v) = var("MAX_IP_FAILURES") { cfg.max_ip_failures = parse_num("CLUSTERGATE_MAX_IP_FAILURES", &v)?; }
        if let Some(v) = var("IP_BLOCK_SECS") { cfg.ip_block_secs = parse_num("CLUSTERGATE_IP_BLOCK_SECS", &v)?; }
        if let Some(v) = var("IP_DELAYS_MS") { cfg.ip_delays_ms = parse_delays("CLUSTERGATE_IP_DELAYS_MS", &v)?; }
        if let Some(v) = var("LOCKOUT_THRESHOLD") { cfg.lockout_threshold = parse_num("CLUSTERGATE_LOCKOUT_THRESHOLD", &v)?; }
        if let Some(v) = var("LOCKOUT_SECS") { cfg.lockout_secs = parse_num("CLUSTERGATE_LOCKOUT_SECS", &v)?; }
        if let Some(v) = var("SWEEP_INTERVAL_SECS") { cfg.sweep_interval_secs = parse_num("CLUSTERGATE_SWEEP_INTERVAL_SECS", &v)?; }
        if let Some(v) = var("ACCESS_REQUEST_TTL_SECS") { cfg.access_request_ttl_secs = parse_num("CLUSTERGATE_ACCESS_REQUEST_TTL_SECS", &v)?; }
        if let Some(v) = var("ADMIN_USER") { cfg.admin_user = v; }
        if let Some(v) = var("ADMIN_PASSWORD") { cfg.admin_password = Some(v); }
        if let Some(v) = var("SECURE_COOKIES").and_then(|v| parse_bool(&v)) { cfg.secure_cookies = v; }
        if let Some(v) = var("TRUST_PROXY_HEADERS").and_then(|v| parse_bool(&v)) { cfg.trust_proxy_headers = v; }

        // command line overrides environment
        if let Some(v) = arg_value(args, "--http-port") { cfg.http_port = parse_num("--http-port", v)?; }
        if let Some(v) = arg_value(args, "--data-dir") { cfg.data_dir = Some(PathBuf::from(v)); }
        if let Some(v) = arg_value(args, "--audit-log") { cfg.audit_log = Some(PathBuf::from(v)); }
        if let Some(v) = arg_value(args, "--session-ttl-secs") { cfg.session_ttl_secs = parse_num("--session-ttl-secs", v)?; }
        if let Some(v) = arg_value(args, "--access-request-ttl-secs") { cfg.access_request_ttl_secs = parse_num("--access-request-ttl-secs", v)?; }
        if let Some(v) = arg_value(args, "--admin-user") { cfg.admin_user = v.to_string(); }
        if let Some(v) = arg_value(args, "--admin-password") { cfg.admin_password = Some(v.to_string()); }
        if has_flag(args, "--insecure-cookies") { cfg.secure_cookies = false; }
        if has_flag(args, "--ignore-proxy-headers") { cfg.trust_proxy_headers = false; }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config file {}", path))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing config file {}", path))
    }

    fn validate(&self) -> Result<()> {
        if self.max_ip_failures == 0 { anyhow::bail!("max_ip_failures must be at least 1"); }
        if self.lockout_threshold == 0 { anyhow::bail!("lockout_threshold must be at least 1"); }
        if self.sweep_interval_secs == 0 { anyhow::bail!("sweep_interval_secs must be at least 1"); }
        if self.admin_user.trim().is_empty() { anyhow::bail!("admin_user must not be empty"); }
        for (name, secs) in [
            ("session_ttl_secs", self.session_ttl_secs),
            ("csrf_ttl_secs", self.csrf_ttl_secs),
            ("ip_block_secs", self.ip_block_secs),
            ("lockout_secs", self.lockout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("access_request_ttl_secs", self.access_request_ttl_secs),
        ] {
            if secs > MAX_DURATION_SECS { anyhow::bail!("{} must be at most {} seconds", name, MAX_DURATION_SECS); }
        }
        if let Some(ms) = self.ip_delays_ms.iter().find(|ms| **ms / 1_000 > MAX_DURATION_SECS) {
            anyhow::bail!("ip_delays_ms entry {} is out of range", ms);
        }
        Ok(())
    }

    pub fn brute_force_policy(&self) -> BruteForcePolicy {
        BruteForcePolicy {
            max_failures: self.max_ip_failures,
            block_duration: Duration::from_secs(self.ip_block_secs),
            delays: self.ip_delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.lockout_threshold,
            lock_duration: Duration::from_secs(self.lockout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn session_ttl(&self) -> Duration { Duration::from_secs(self.session_ttl_secs) }
    pub fn csrf_ttl(&self) -> Duration { Duration::from_secs(self.csrf_ttl_secs) }
    pub fn access_request_ttl(&self) -> Duration { Duration::from_secs(self.access_request_ttl_secs) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn defaults_match_policy() {
        let cfg = GateConfig::resolve(&[], |_| None).unwrap();
        assert_eq!(cfg, GateConfig::default());
        let bp = cfg.brute_force_policy();
        assert_eq!(bp, BruteForcePolicy::default());
        assert_eq!(cfg.lockout_policy(), LockoutPolicy::default());
    }

    #[test]
    fn cli_beats_env_beats_default() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CLUSTERGATE_HTTP_PORT", "9000"),
            ("CLUSTERGATE_LOCKOUT_THRESHOLD", "3"),
            ("CLUSTERGATE_IP_DELAYS_MS", "0,0,10,20"),
            ("CLUSTERGATE_SECURE_COOKIES", "off"),
        ]);
        let cfg = GateConfig::resolve(&args(&["bin", "--http-port", "9100"]), |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.http_port, 9100);
        assert_eq!(cfg.lockout_threshold, 3);
        assert_eq!(cfg.ip_delays_ms, vec![0, 0, 10, 20]);
        assert!(!cfg.secure_cookies);
        assert!(cfg.trust_proxy_headers);
        let cfg = GateConfig::resolve(&args(&["bin", "--ignore-proxy-headers"]), |_| None).unwrap();
        assert!(!cfg.trust_proxy_headers);
    }

    #[test]
    fn config_file_sits_under_env() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("gate.json");
        std::fs::write(&path, r#"{"http_port": 7000, "admin_user": "root", "lockout_secs": 60}"#)?;
        let p = path.to_string_lossy().to_string();
        let cfg = GateConfig::resolve(&args(&["bin", &format!("--config={}", p)]), |k| {
            (k == "CLUSTERGATE_HTTP_PORT").then(|| "7100".to_string())
        })?;
        assert_eq!(cfg.http_port, 7100);
        assert_eq!(cfg.admin_user, "root");
        assert_eq!(cfg.lockout_secs, 60);
        assert_eq!(cfg.max_ip_failures, 5);
        Ok(())
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(GateConfig::resolve(&args(&["bin", "--http-port", "huge"]), |_| None).is_err());
        let err = GateConfig::resolve(&[], |k| (k == "CLUSTERGATE_LOCKOUT_THRESHOLD").then(|| "0".to_string())).unwrap_err();
        assert!(err.to_string().contains("lockout_threshold"));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let max = u64::MAX.to_string();
        for var in ["CLUSTERGATE_IP_BLOCK_SECS", "CLUSTERGATE_LOCKOUT_SECS", "CLUSTERGATE_ACCESS_REQUEST_TTL_SECS", "CLUSTERGATE_SESSION_TTL_SECS"] {
            let err = GateConfig::resolve(&[], |k| (k == var).then(|| max.clone())).unwrap_err();
            assert!(err.to_string().contains("at most"), "{}: {}", var, err);
        }
        let ok = GateConfig::resolve(&[], |k| (k == "CLUSTERGATE_IP_BLOCK_SECS").then(|| MAX_DURATION_SECS.to_string()));
        assert!(ok.is_ok());
    }
}
