use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Tallies of backend operations, reset on a fixed period.
pub trait UsageRecorder: Send + Sync {
    fn record_reads(&self, count: u64);
    fn record_writes(&self, count: u64);
    fn record_deletes(&self, count: u64);
    fn snapshot(&self) -> UsageSnapshot;
    /// Returns the tallies accumulated before the reset.
    fn reset(&self) -> UsageSnapshot;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
pub struct UsageCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageRecorder for UsageCounters {
    fn record_reads(&self, count: u64) {
        self.reads.fetch_add(count, Ordering::Relaxed);
    }

    fn record_writes(&self, count: u64) {
        self.writes.fetch_add(count, Ordering::Relaxed);
    }

    fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) -> UsageSnapshot {
        UsageSnapshot {
            reads: self.reads.swap(0, Ordering::Relaxed),
            writes: self.writes.swap(0, Ordering::Relaxed),
            deletes: self.deletes.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_returns_previous_tallies_and_zeroes() {
        let counters = UsageCounters::new();
        counters.record_reads(6);
        counters.record_writes(2);
        counters.record_deletes(1);

        let before = counters.reset();
        assert_eq!(before, UsageSnapshot { reads: 6, writes: 2, deletes: 1 });
        assert_eq!(counters.snapshot(), UsageSnapshot::default());
    }
}
