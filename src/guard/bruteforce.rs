//! Per-address progressive throttle.
//!
//! Failure n earns `delays[n]` of stall before that address's next credential
//! check; reaching `max_failures` blocks the address outright.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::counter::{FailurePolicy, FailureTable};
use super::sweeper::Sweeper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BruteForcePolicy {
    pub max_failures: u32,
    pub block_duration: Duration,
    /// Indexed by failure count; the last entry covers any larger count.
    pub delays: Vec<Duration>,
    pub sweep_interval: Duration,
}

impl Default for BruteForcePolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            block_duration: Duration::from_secs(15 * 60),
            delays: vec![Duration::ZERO, Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(5)],
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// What the caller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Delay(Duration),
    Blocked,
}

pub struct BruteForceProtector {
    table: Arc<FailureTable>,
    delays: Vec<Duration>,
    sweeper: Sweeper,
}

impl BruteForceProtector {
    pub fn new(policy: BruteForcePolicy) -> Self {
        let table = Arc::new(FailureTable::new(FailurePolicy { threshold: policy.max_failures, block_duration: policy.block_duration }));
        let sweeper = Sweeper::spawn("bruteforce", &table, policy.sweep_interval);
        Self { table, delays: policy.delays, sweeper }
    }

    fn delay_at(&self, count: u32) -> Duration {
        if count == 0 || self.delays.is_empty() { return Duration::ZERO; }
        let idx = (count as usize).min(self.delays.len() - 1);
        self.delays[idx]
    }

    pub fn is_blocked(&self, ip: &str) -> bool { self.table.is_blocked(ip) }

    pub fn blocked_for(&self, ip: &str) -> Option<Duration> { self.table.blocked_for(ip) }

    /// Stall owed before the next credential check from `ip`.
    pub fn delay_for(&self, ip: &str) -> Duration {
        if self.table.is_blocked(ip) { return Duration::ZERO; }
        self.delay_at(self.table.failure_count(ip))
    }

    pub fn record_failure(&self, ip: &str) -> Throttle {
        let out = self.table.record_failure(ip);
        if out.newly_blocked {
            warn!(target: "guard", "address {} blocked for {:?} after {} consecutive failed logins", ip, self.table.policy().block_duration, out.failure_count);
        }
        if out.blocked { Throttle::Blocked } else { Throttle::Delay(self.delay_at(out.failure_count)) }
    }

    pub fn record_success(&self, ip: &str) { self.table.record_success(ip); }

    pub fn failure_count(&self, ip: &str) -> u32 { self.table.failure_count(ip) }

    pub fn sweep(&self) -> usize { self.table.sweep() }

    pub fn stop(&self) { self.sweeper.stop(); }
}
