//! Process-wide counters, exposed over REST for basic operability.
//!
//! Kept deliberately simple: plain atomics behind a lazily-initialized
//! singleton, no external metrics crate. `snapshot()` is the only way
//! anything outside this module observes the counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub sessions_active: AtomicU64,
    pub sessions_created: AtomicU64,
    pub messages_in: AtomicU64,
    pub messages_out: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub snapshots_sent: AtomicU64,
    pub hash_mismatches: AtomicU64,
    pub cold_store_flushes: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_active: u64,
    pub sessions_created: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub messages_rejected: u64,
    pub snapshots_sent: u64,
    pub hash_mismatches: u64,
    pub cold_store_flushes: u64,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Idempotent: the first call wins, subsequent calls return the same
/// instance.
pub fn global() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            snapshots_sent: self.snapshots_sent.load(Ordering::Relaxed),
            hash_mismatches: self.hash_mismatches.load(Ordering::Relaxed),
            cold_store_flushes: self.cold_store_flushes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_a_singleton() {
        let a = global() as *const Metrics;
        let b = global() as *const Metrics;
        assert_eq!(a, b);
    }

    #[test]
    fn incr_is_observable_in_snapshot() {
        let m = Metrics::default();
        Metrics::incr(&m.messages_in);
        Metrics::incr(&m.messages_in);
        assert_eq!(m.snapshot().messages_in, 2);
    }
}
