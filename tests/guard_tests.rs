//! Credential-abuse defenses under realistic sequences and concurrency.

use std::sync::Arc;
use std::time::Duration;

use clustergate::guard::{AccountLockout, BruteForcePolicy, BruteForceProtector, LockoutPolicy, Throttle};

fn ms(n: u64) -> Duration { Duration::from_millis(n) }

fn protector(block: Duration) -> BruteForceProtector {
    BruteForceProtector::new(BruteForcePolicy {
        max_failures: 5,
        block_duration: block,
        delays: vec![ms(0), ms(0), ms(5), ms(10), ms(20)],
        sweep_interval: Duration::from_secs(60),
    })
}

#[test]
fn progressive_delays_then_block() {
    let bp = protector(Duration::from_secs(60));
    let ip = "203.0.113.10";
    let seen: Vec<Throttle> = (0..5).map(|_| bp.record_failure(ip)).collect();
    assert_eq!(seen, vec![Throttle::Delay(ms(0)), Throttle::Delay(ms(5)), Throttle::Delay(ms(10)), Throttle::Delay(ms(20)), Throttle::Blocked]);
    // delays strictly escalate across failures 2..4
    let delays: Vec<Duration> = seen.iter().filter_map(|t| match t { Throttle::Delay(d) => Some(*d), Throttle::Blocked => None }).collect();
    assert!(delays[1..].windows(2).all(|w| w[0] < w[1]), "{:?}", delays);
    assert_eq!(bp.delay_for(ip), Duration::ZERO, "blocked addresses are refused, not stalled");
    assert!(bp.is_blocked(ip));
    assert_eq!(bp.failure_count(ip), 5);
    bp.record_success(ip);
    assert!(!bp.is_blocked(ip));
    assert_eq!(bp.record_failure(ip), Throttle::Delay(ms(0)));
}

#[test]
fn block_expires_after_duration() {
    let bp = protector(ms(30));
    for _ in 0..5 { bp.record_failure("203.0.113.11"); }
    assert!(bp.is_blocked("203.0.113.11"));
    std::thread::sleep(ms(60));
    assert!(!bp.is_blocked("203.0.113.11"));
    assert_eq!(bp.failure_count("203.0.113.11"), 0);
}

#[test]
fn lockout_is_per_account_not_per_address() {
    let al = AccountLockout::new(LockoutPolicy { threshold: 10, lock_duration: Duration::from_secs(60), sweep_interval: Duration::from_secs(60) });
    let bp = protector(Duration::from_secs(60));
    for i in 0..10u32 {
        // a fresh address for every attempt never trips the address block
        let ip = format!("10.1.0.{}", i);
        assert!(!bp.is_blocked(&ip));
        bp.record_failure(&ip);
        let locked = al.record_failure("alice");
        assert_eq!(locked, i == 9, "attempt {}", i + 1);
    }
    assert!(al.is_locked("alice"));
    assert!(!al.is_locked("bob"));
    assert!(!bp.is_blocked("10.9.9.9"));
    assert!(al.locked_for("alice").is_some());
}

#[test]
fn concurrent_failures_are_counted_exactly() {
    let al = Arc::new(AccountLockout::new(LockoutPolicy { threshold: 1_000, lock_duration: Duration::from_secs(60), sweep_interval: Duration::from_secs(60) }));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let al = al.clone();
            std::thread::spawn(move || {
                for _ in 0..100 { al.record_failure("shared"); }
            })
        })
        .collect();
    for h in handles { h.join().expect("thread"); }
    assert_eq!(al.failure_count("shared"), 800);
    assert!(!al.is_locked("shared"));
}

#[tokio::test]
async fn background_sweep_evicts_and_stop_is_idempotent() {
    let bp = BruteForceProtector::new(BruteForcePolicy {
        max_failures: 1,
        block_duration: ms(10),
        delays: vec![Duration::ZERO],
        sweep_interval: ms(20),
    });
    bp.record_failure("192.0.2.1");
    tokio::time::sleep(ms(100)).await;
    assert_eq!(bp.sweep(), 0, "background sweep should already have evicted the entry");
    bp.stop();
    bp.stop();
}
