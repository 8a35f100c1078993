//! Keyed failure counters with a threshold block, shared by the per-address
//! throttle and the per-account lockout.
//!
//! Every query re-derives state from stored instants: an entry whose block
//! has elapsed reads as freshly reset even before a sweep removes it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Longest block a table will impose; larger policy values are clamped.
pub const MAX_BLOCK_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Consecutive failures that trigger a block.
    pub threshold: u32,
    pub block_duration: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct FailureEntry {
    pub failure_count: u32,
    pub last_failure_at: Instant,
    pub blocked_until: Option<Instant>,
}

impl FailureEntry {
    fn blocked_at(&self, now: Instant) -> bool { self.blocked_until.map(|t| now < t).unwrap_or(false) }
    fn block_elapsed(&self, now: Instant) -> bool { self.blocked_until.map(|t| now >= t).unwrap_or(false) }
}

/// Result of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub failure_count: u32,
    pub blocked: bool,
    /// True only on the failure that crossed the threshold.
    pub newly_blocked: bool,
}

pub struct FailureTable {
    policy: FailurePolicy,
    entries: RwLock<HashMap<String, FailureEntry>>,
}

impl FailureTable {
    pub fn new(mut policy: FailurePolicy) -> Self {
        policy.block_duration = policy.block_duration.min(MAX_BLOCK_DURATION);
        Self { policy, entries: RwLock::new(HashMap::new()) }
    }

    pub fn policy(&self) -> FailurePolicy { self.policy }

    pub fn is_blocked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.read().get(key).map(|e| e.blocked_at(now)).unwrap_or(false)
    }

    /// Remaining block time, if any.
    pub fn blocked_for(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let until = self.entries.read().get(key)?.blocked_until?;
        until.checked_duration_since(now).filter(|d| !d.is_zero())
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        let now = Instant::now();
        match self.entries.read().get(key) {
            Some(e) if e.block_elapsed(now) => 0,
            Some(e) => e.failure_count,
            None => 0,
        }
    }

    pub fn record_failure(&self, key: &str) -> FailureOutcome {
        let now = Instant::now();
        let mut map = self.entries.write();
        let entry = map.entry(key.to_string()).or_insert(FailureEntry { failure_count: 0, last_failure_at: now, blocked_until: None });
        if entry.block_elapsed(now) {
            entry.failure_count = 0;
            entry.blocked_until = None;
        }
        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_at = now;
        let mut newly_blocked = false;
        if entry.failure_count >= self.policy.threshold && entry.blocked_until.is_none() {
            entry.blocked_until = Some(now.checked_add(self.policy.block_duration).unwrap_or(now + MAX_BLOCK_DURATION));
            newly_blocked = true;
        }
        FailureOutcome { failure_count: entry.failure_count, blocked: entry.blocked_at(now), newly_blocked }
    }

    /// Clear the key's counter and any block.
    pub fn record_success(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Drop entries whose block has elapsed, or that never blocked and have
    /// been idle for twice the block duration. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let stale_after = self.policy.block_duration.saturating_mul(2);
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| match e.blocked_until {
            Some(until) => now < until,
            None => now.saturating_duration_since(e.last_failure_at) <= stale_after,
        });
        before - map.len()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(threshold: u32, ms: u64) -> FailureTable {
        FailureTable::new(FailurePolicy { threshold, block_duration: Duration::from_millis(ms) })
    }

    #[test]
    fn blocks_exactly_at_threshold() {
        let t = table(3, 60_000);
        assert!(!t.record_failure("k").blocked);
        assert!(!t.record_failure("k").blocked);
        let third = t.record_failure("k");
        assert!(third.blocked && third.newly_blocked);
        assert_eq!(third.failure_count, 3);
        let fourth = t.record_failure("k");
        assert!(fourth.blocked && !fourth.newly_blocked);
        assert!(t.is_blocked("k"));
        assert!(t.blocked_for("k").is_some());
        assert!(!t.is_blocked("other"));
    }

    #[test]
    fn success_resets_count_and_block() {
        let t = table(2, 60_000);
        t.record_failure("k");
        t.record_failure("k");
        assert!(t.is_blocked("k"));
        t.record_success("k");
        assert!(!t.is_blocked("k"));
        assert_eq!(t.failure_count("k"), 0);
        assert!(t.is_empty());
    }

    #[test]
    fn unseen_key_reads_as_reset() {
        let t = table(2, 10);
        assert_eq!(t.failure_count("nobody"), 0);
        assert!(!t.is_blocked("nobody"));
        t.record_success("nobody");
        assert!(t.blocked_for("nobody").is_none());
    }

    #[test]
    fn elapsed_block_restarts_counting() {
        let t = table(2, 20);
        t.record_failure("k");
        t.record_failure("k");
        assert!(t.is_blocked("k"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!t.is_blocked("k"));
        assert_eq!(t.failure_count("k"), 0);
        let o = t.record_failure("k");
        assert_eq!(o.failure_count, 1);
        assert!(!o.blocked);
    }

    #[test]
    fn oversized_block_is_clamped() {
        let t = FailureTable::new(FailurePolicy { threshold: 1, block_duration: Duration::MAX });
        assert_eq!(t.policy().block_duration, MAX_BLOCK_DURATION);
        assert!(t.record_failure("k").blocked);
        assert!(t.blocked_for("k").is_some_and(|d| d <= MAX_BLOCK_DURATION));
    }

    #[test]
    fn sweep_only_removes_expired() {
        let t = table(1, 1_000);
        t.record_failure("blocked");
        let now = Instant::now();
        assert_eq!(t.sweep_at(now), 0);
        assert_eq!(t.sweep_at(now + Duration::from_millis(1_500)), 1);
        assert!(t.is_empty());

        let t = table(5, 1_000);
        t.record_failure("idle");
        let now = Instant::now();
        assert_eq!(t.sweep_at(now + Duration::from_millis(1_500)), 0);
        assert_eq!(t.sweep_at(now + Duration::from_millis(2_500)), 1);
    }
}
