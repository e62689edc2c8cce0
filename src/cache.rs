//! Deduplicating cache of dictionary fetches, keyed by resource path.
//!
//! The first request for a path starts the fetch and stores a shared handle
//! to its eventual result; every later request for that path gets a clone of
//! the same handle until the entry is invalidated. Transport failures settle
//! as `None` ("not found") and are cached like any other result.
//!
//! When a tokio runtime is available the fetch is spawned onto it, so it runs
//! to completion (and its result stays cached) even if every caller that was
//! waiting on it has given up.

use crate::fetch::{Dictionary, Fetcher};
use crate::i18n::FetchMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tracing::debug;

/// Memoized result of one fetch: the dictionary, or `None` when absent.
pub type SharedFetch = Shared<BoxFuture<'static, Option<Arc<Dictionary>>>>;

pub struct FetchCache {
    fetcher: Arc<dyn Fetcher>,
    entries: Mutex<HashMap<String, SharedFetch>>,
    metrics: Arc<FetchMetrics>,
}

impl FetchCache {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            metrics: Arc::new(FetchMetrics::new()),
        }
    }

    /// Get the shared result for `path`, starting the fetch on first use.
    pub fn get(&self, path: &str) -> SharedFetch {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entries.get(path) {
            self.metrics.record_cache_hit();
            return existing.clone();
        }

        self.metrics.record_cache_miss();
        let shared = self.start_fetch(path);
        entries.insert(path.to_string(), shared.clone());
        shared
    }

    /// Remove every entry whose path matches `predicate`. Returns the number
    /// of entries removed. In-flight fetches are not aborted; their results
    /// are simply no longer reachable from the cache.
    ///
    /// Removing an entry whose fetch is still running means the next `get`
    /// for that path starts a second fetch alongside the first. Each result
    /// is only ever seen by the callers of its own entry.
    pub fn invalidate(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|path, _| !predicate(path));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Invalidated {} cached dictionary fetches", removed);
            self.metrics.record_invalidations(removed);
        }
        removed
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> &FetchMetrics {
        &self.metrics
    }

    fn start_fetch(&self, path: &str) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let metrics = Arc::clone(&self.metrics);
        let path = path.to_string();

        let fetch = async move {
            match fetcher.fetch(&path).await {
                Ok(dictionary) => Some(Arc::new(dictionary)),
                Err(e) => {
                    metrics.record_fetch_failure();
                    debug!("Treating {} as not found: {}", path, e);
                    None
                }
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(fetch);
                async move { task.await.ok().flatten() }.boxed().shared()
            }
            Err(_) => fetch.boxed().shared(),
        }
    }
}
