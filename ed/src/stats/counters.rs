//! Shared event counters

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Row key of the published counter
pub const PUBLISHED: &str = "published";

/// Row key of the capture miss counter
pub const MISSED_CACHE: &str = "missed_cache";

/// Monotonic counters shared by the collector, the capture task and the
/// writer
///
/// Each counter is an independent atomic. The `updated` flag is the only
/// signal to the writer: set with release ordering after a counter changes,
/// swapped out with acquire ordering before the writer reads them.
#[derive(Debug, Default)]
pub struct StatsCounters {
    published: AtomicU64,
    missed_cache: AtomicU64,
    updated: AtomicBool,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_published(&self, n: u64) {
        self.published.fetch_add(n, Ordering::Relaxed);
        self.mark_updated();
    }

    pub fn inc_missed_cache(&self) {
        self.missed_cache.fetch_add(1, Ordering::Relaxed);
        self.mark_updated();
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn missed_cache(&self) -> u64 {
        self.missed_cache.load(Ordering::Relaxed)
    }

    /// Seed the counters with persisted values, without marking them dirty
    pub fn restore(&self, published: u64, missed_cache: u64) {
        self.published.store(published, Ordering::Relaxed);
        self.missed_cache.store(missed_cache, Ordering::Relaxed);
    }

    pub fn mark_updated(&self) {
        self.updated.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_updated(&self) -> bool {
        self.updated.swap(false, Ordering::AcqRel)
    }

    /// Counter values by row key
    pub fn snapshot(&self) -> [(&'static str, u64); 2] {
        [(PUBLISHED, self.published()), (MISSED_CACHE, self.missed_cache())]
    }
}
