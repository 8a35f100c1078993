//! Per-account lockout, keyed by username and independent of the caller's
//! address, so rotating addresses does not reset it.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::counter::{FailurePolicy, FailureTable};
use super::sweeper::Sweeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub lock_duration: Duration,
    pub sweep_interval: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self { threshold: 10, lock_duration: Duration::from_secs(30 * 60), sweep_interval: Duration::from_secs(5 * 60) }
    }
}

pub struct AccountLockout {
    table: Arc<FailureTable>,
    sweeper: Sweeper,
}

impl AccountLockout {
    pub fn new(policy: LockoutPolicy) -> Self {
        let table = Arc::new(FailureTable::new(FailurePolicy { threshold: policy.threshold, block_duration: policy.lock_duration }));
        let sweeper = Sweeper::spawn("lockout", &table, policy.sweep_interval);
        Self { table, sweeper }
    }

    pub fn is_locked(&self, account: &str) -> bool { self.table.is_blocked(account) }

    pub fn locked_for(&self, account: &str) -> Option<Duration> { self.table.blocked_for(account) }

    /// Returns true when the account is locked after this failure.
    pub fn record_failure(&self, account: &str) -> bool {
        let out = self.table.record_failure(account);
        if out.newly_blocked {
            warn!(target: "guard", "account '{}' locked for {:?} after {} consecutive failed logins", account, self.table.policy().block_duration, out.failure_count);
        }
        out.blocked
    }

    pub fn record_success(&self, account: &str) { self.table.record_success(account); }

    pub fn failure_count(&self, account: &str) -> u32 { self.table.failure_count(account) }

    pub fn sweep(&self) -> usize { self.table.sweep() }

    pub fn stop(&self) { self.sweeper.stop(); }
}
