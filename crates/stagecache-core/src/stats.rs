use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Access counters shared by all clones of a dataset.
#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    uncached: AtomicU64,
    prefix_runs: AtomicU64,
    writes: AtomicU64,
    skipped_writes: AtomicU64,
}

impl CacheStats {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn uncached(&self) {
        self.uncached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn prefix_run(&self) {
        self.prefix_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, published: bool) {
        if published {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.skipped_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
            prefix_runs: self.prefix_runs.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Accesses served from storage.
    pub hits: u64,
    /// Accesses that computed and stored the prefix.
    pub misses: u64,
    /// Accesses outside the cached range (or with caching off).
    pub uncached: u64,
    /// Prefix computations, including eager population.
    pub prefix_runs: u64,
    /// Entries this dataset published.
    pub writes: u64,
    /// Publishes skipped because the entry already existed.
    pub skipped_writes: u64,
}
