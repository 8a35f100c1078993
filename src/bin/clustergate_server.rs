//!
//! clustergate server binary
//! -------------------------
//! Command-line entry point for the console's trust-and-access service.
//! Supports configuration via CLI flags, `CLUSTERGATE_*` environment variables
//! and an optional JSON config file.

use anyhow::Result;
use std::env;

use clustergate::config::{has_flag, GateConfig};

const USAGE: &str = "clustergate Server

USAGE:
  clustergate_server [--config PATH] [--http-port N] [--data-dir PATH] [--audit-log PATH]
                     [--session-ttl-secs N] [--access-request-ttl-secs N]
                     [--admin-user NAME] [--admin-password PASS] [--insecure-cookies]
                     [--ignore-proxy-headers]

OPTIONS:
  --config PATH                 JSON config file (env: CLUSTERGATE_CONFIG)
  --http-port N                 HTTP API port (env: CLUSTERGATE_HTTP_PORT, default 8080)
  --data-dir PATH               Persist custom roles and access requests here (env: CLUSTERGATE_DATA_DIR)
  --audit-log PATH              Append JSON-line audit records (env: CLUSTERGATE_AUDIT_LOG)
  --session-ttl-secs N          Session lifetime (env: CLUSTERGATE_SESSION_TTL_SECS, default 86400)
  --access-request-ttl-secs N   Access request lifetime (env: CLUSTERGATE_ACCESS_REQUEST_TTL_SECS, default 1800)
  --admin-user NAME             Bootstrap admin account (env: CLUSTERGATE_ADMIN_USER, default admin)
  --admin-password PASS         Bootstrap admin password (env: CLUSTERGATE_ADMIN_PASSWORD; generated when unset)
  --insecure-cookies            Drop the Secure cookie attribute (plain-HTTP development only)
  --ignore-proxy-headers        Use the peer address, not X-Forwarded-For/X-Real-IP (env: CLUSTERGATE_TRUST_PROXY_HEADERS=false)
";

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"        __           __                        __
  _____/ /_  _______/ /____  _________ _____ _/ /____
 / ___/ / / / / ___/ __/ _ \/ ___/ __ `/ __ `/ __/ _ \
/ /__/ / /_/ (__  ) /_/  __/ /  / /_/ / /_/ / /_/  __/
\___/_/\__,_/____/\__/\___/_/   \__, /\__,_/\__/\___/
                               /____/");

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let cfg = GateConfig::from_env_and_args(&args)?;
    tracing::info!(
        target: "startup",
        "clustergate starting: http_port={}, data_dir={:?}, audit_log={:?}, lockout_threshold={}, max_ip_failures={}",
        cfg.http_port, cfg.data_dir, cfg.audit_log, cfg.lockout_threshold, cfg.max_ip_failures
    );
    clustergate::server::run(cfg).await
}
