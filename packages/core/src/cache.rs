use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::scheduler::BlogSchedulingStats;

/// Short-lived cache for the scheduling stats endpoint.
///
/// Entries are tagged with the scheduler's run count, so a finished run
/// invalidates the cached stats even inside the TTL.
pub struct StatsCache {
    entry: Mutex<Option<CachedStats>>,
    ttl: Duration,
}

struct CachedStats {
    stats: BlogSchedulingStats,
    runs: u64,
    cached_at: Instant,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    fn entry(&self) -> MutexGuard<'_, Option<CachedStats>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached stats if still within TTL and no run has finished since.
    pub fn get(&self, runs: u64) -> Option<BlogSchedulingStats> {
        self.entry()
            .as_ref()
            .filter(|cached| cached.runs == runs && cached.cached_at.elapsed() <= self.ttl)
            .map(|cached| cached.stats.clone())
    }

    pub fn set(&self, stats: BlogSchedulingStats, runs: u64) {
        *self.entry() = Some(CachedStats {
            stats,
            runs,
            cached_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        *self.entry() = None;
    }
}
