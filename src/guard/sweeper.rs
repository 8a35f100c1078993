//! Periodic eviction task for failure tables.
//!
//! The task holds only a weak reference to its table and exits on its own
//! once the table is dropped. `stop()` may be called any number of times.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use super::counter::FailureTable;

pub struct Sweeper {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    running: bool,
}

impl Sweeper {
    /// Start sweeping `table` every `interval`. Without a Tokio runtime no task
    /// is spawned; lazy expiry on every read keeps results correct regardless.
    pub fn spawn(name: &'static str, table: &Arc<FailureTable>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = match tokio::runtime::Handle::try_current() {
            Ok(h) => {
                h.spawn(sweep_loop(name, Arc::downgrade(table), interval, stop_rx));
                true
            }
            Err(_) => {
                debug!(target: "guard", "{}: no runtime, background sweep disabled", name);
                false
            }
        };
        Self { name, stop_tx, running }
    }

    /// Signal the task to exit. Never blocks and never fails.
    pub fn stop(&self) {
        let was_stopped = self.stop_tx.send_replace(true);
        if !was_stopped && self.running {
            debug!(target: "guard", "{}: sweep stopped", self.name);
        }
    }

    pub fn is_stopped(&self) -> bool { *self.stop_tx.borrow() }
}

impl Drop for Sweeper {
    fn drop(&mut self) { self.stop(); }
}

async fn sweep_loop(name: &'static str, table: Weak<FailureTable>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(t) = table.upgrade() else { break; };
                let removed = t.sweep();
                if removed > 0 {
                    debug!(target: "guard", "{}: swept {} expired entr{}", name, removed, if removed == 1 { "y" } else { "ies" });
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() { break; }
            }
        }
    }
}
