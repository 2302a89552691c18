//! Per-session reading admission.
//!
//! Every session owns one token bucket: a fixed-ceiling counter that a
//! background task refills at a steady cadence. A drained bucket stalls the
//! session's read loop, which pushes backpressure onto the device through
//! the TCP receive window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Fixed-ceiling token counter with a background refiller.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: Arc<AtomicU64>,
    refilled: Arc<Notify>,
    stop: CancellationToken,
}

impl TokenBucket {
    /// Creates a bucket holding `ceiling` tokens and spawns the refiller,
    /// which restores one token per `refill_period` while below the ceiling.
    pub fn new(ceiling: u64, refill_period: Duration) -> Self {
        let tokens = Arc::new(AtomicU64::new(ceiling));
        let refilled = Arc::new(Notify::new());
        let stop = CancellationToken::new();

        let refill_tokens = Arc::clone(&tokens);
        let refill_notify = Arc::clone(&refilled);
        let refill_stop = stop.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refill_period);
            // A missed tick must not turn into a refill burst.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; the cadence starts one
            // full period out.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = refill_stop.cancelled() => return,
                    _ = ticker.tick() => {
                        let grew = refill_tokens
                            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                                (n < ceiling).then_some(n + 1)
                            })
                            .is_ok();
                        if grew {
                            refill_notify.notify_waiters();
                        }
                    }
                }
            }
        });

        Self {
            tokens,
            refilled,
            stop,
        }
    }

    /// Current token count.
    pub fn get(&self) -> u64 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Takes one token; `false` when the bucket is drained.
    pub fn try_consume(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Waits until at least one token is observable, or until `cancel`
    /// fires. Returns `false` on cancellation. Does not consume.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            if self.get() > 0 {
                return true;
            }
            let refilled = self.refilled.notified();
            // Re-check: a refill between the load and `notified()` would
            // otherwise be missed until the next tick.
            if self.get() > 0 {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = refilled => {}
            }
        }
    }

    /// Halts the refiller. Idempotent; the counter keeps its last value.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
