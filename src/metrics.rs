use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for ring activity.
///
/// All updates use `Relaxed` ordering; counters are diagnostics, not part of
/// the synchronization protocol. Collection is gated by
/// [`RingConfig::enable_metrics`](crate::RingConfig::enable_metrics).
#[derive(Debug, Default)]
pub struct Metrics {
    /// Completed `step` calls (both paths).
    steps: AtomicU64,
    /// Steps that took the refusal path (evict + regrow).
    evictions: AtomicU64,
    /// Slots constructed by the factory.
    allocated: AtomicU64,
    /// Evicted slots returned to the pool.
    recycled: AtomicU64,
    /// Evicted slots left to their readers, never reclaimed.
    orphaned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_allocated(&self, n: u64) {
        self.allocated.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_recycled(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            steps: self.steps.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub steps: u64,
    pub evictions: u64,
    pub allocated: u64,
    pub recycled: u64,
    pub orphaned: u64,
}
