//! Fetch metrics and observability module.
//!
//! This module tracks how the fetch cache is used: hits served from memory,
//! misses that started a transport fetch, fetches that failed and were
//! coerced to "not found", and entries dropped by invalidation.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters owned by a single `FetchCache`.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    /// Number of requests answered by an existing (pending or settled) entry
    cache_hits: AtomicUsize,

    /// Number of requests that had to start a new fetch
    cache_misses: AtomicUsize,

    /// Number of fetches that failed at the transport level
    fetch_failures: AtomicUsize,

    /// Number of cache entries removed by invalidation
    invalidations: AtomicUsize,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit (request joined an existing entry).
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss (a new fetch was started).
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transport failure.
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` entries removed by invalidation.
    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of fetches started; equals the number of transport calls.
    pub fn cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> usize {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits();
        let misses = self.cache_misses();
        let total = hits + misses;
        let cache_hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            fetch_failures: self.fetch_failures(),
            invalidations: self.invalidations(),
        }
    }
}

/// Point-in-time view of [`FetchMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage of requests served without starting a fetch
    pub cache_hit_rate: f64,
    pub fetch_failures: usize,
    pub invalidations: usize,
}

impl MetricsReport {
    /// Format the report as a short human-readable summary.
    pub fn format_summary(&self) -> String {
        format!(
            "Fetch cache: {} hits, {} misses ({:.1}% hit rate), {} failures, {} invalidated",
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_rate,
            self.fetch_failures,
            self.invalidations
        )
    }
}
