//! Credential-abuse defenses: a per-address throttle and an independent
//! per-account lockout, each with its own background sweep.

pub mod counter;
mod bruteforce;
mod lockout;
mod sweeper;

pub use bruteforce::{BruteForcePolicy, BruteForceProtector, Throttle};
pub use counter::{FailureEntry, FailureOutcome, FailurePolicy, FailureTable};
pub use lockout::{AccountLockout, LockoutPolicy};
pub use sweeper::Sweeper;
