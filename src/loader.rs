//! Namespace loading: asset path registry, fetch, and store population.
//!
//! A namespace is fed into the store at most once per language. Eviction
//! forgets that bookkeeping (and bumps a per-language generation) so a later
//! request loads it again; a fetch that was already in flight when its
//! language was evicted is not allowed to repopulate the store.

use crate::cache::FetchCache;
pub use crate::config::AssetPaths;
use crate::config::MissingFileHandler;
use crate::i18n::FetchMetrics;
use crate::store::TranslationStore;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, error};

type Preload = Shared<BoxFuture<'static, ()>>;

/// Build the registry key for a (language, namespace) pair.
pub fn asset_key(language: &str, namespace: &str) -> String {
    format!("{}.{}", language, namespace)
}

#[derive(Default)]
struct LoadState {
    loaded: HashSet<(String, String)>,
    generations: HashMap<String, u64>,
}

impl LoadState {
    fn generation(&self, language: &str) -> u64 {
        self.generations.get(language).copied().unwrap_or(0)
    }
}

pub struct NamespaceLoader {
    paths: RwLock<HashMap<String, String>>,
    cache: FetchCache,
    store: Arc<dyn TranslationStore>,
    state: Mutex<LoadState>,
    preloads: Mutex<Vec<Preload>>,
    missing_file_handler: Option<MissingFileHandler>,
    enable_logging: bool,
}

impl NamespaceLoader {
    pub fn new(
        cache: FetchCache,
        store: Arc<dyn TranslationStore>,
        missing_file_handler: Option<MissingFileHandler>,
        enable_logging: bool,
    ) -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            cache,
            store,
            state: Mutex::new(LoadState::default()),
            preloads: Mutex::new(Vec::new()),
            missing_file_handler,
            enable_logging,
        }
    }

    /// Register asset paths keyed by `"<language>.<namespace>"`.
    ///
    /// With `preload`, every newly registered namespace of `active_language`
    /// starts loading immediately. The call does not wait for it, but
    /// [`wait_for_preloads`](Self::wait_for_preloads) does.
    pub fn add_paths<I, K, V>(self: &Arc<Self>, paths: I, preload: bool, active_language: &str)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut targets = Vec::new();
        {
            let mut registry = self.paths.write().unwrap_or_else(PoisonError::into_inner);
            for (key, path) in paths {
                let key = key.into();
                if preload {
                    if let Some((language, namespace)) = key.split_once('.') {
                        if language == active_language {
                            targets.push((language.to_string(), namespace.to_string()));
                        }
                    }
                }
                registry.insert(key, path.into());
            }
        }

        if !targets.is_empty() {
            self.start_preload(targets);
        }
    }

    /// Resource path registered for (language, namespace), if any.
    pub fn path_for(&self, language: &str, namespace: &str) -> Option<String> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&asset_key(language, namespace))
            .cloned()
    }

    /// Make sure (language, namespace) is in the store. Returns whether a
    /// dictionary exists for it.
    ///
    /// Unregistered pairs report "not found" through the missing-file
    /// handler (or the log) on every call; nothing is cached for them, so a
    /// later registration takes effect.
    pub async fn ensure_loaded(&self, language: &str, namespace: &str) -> bool {
        let generation = self.generation(language);
        self.ensure_loaded_as_of(language, namespace, generation).await
    }

    /// Like [`ensure_loaded`](Self::ensure_loaded), for a caller that
    /// observed `language` in use at `generation`.
    ///
    /// If the language has been evicted since, nothing is fetched and the
    /// store is left alone. A fetch that finishes after an eviction is
    /// dropped from the cache as well as from the store.
    pub async fn ensure_loaded_as_of(
        &self,
        language: &str,
        namespace: &str,
        generation: u64,
    ) -> bool {
        let Some(path) = self.path_for(language, namespace) else {
            self.report_missing_file(namespace, language);
            return false;
        };

        if self.generation(language) != generation {
            debug!(
                "Skipping {}.{}: language was evicted before loading",
                language, namespace
            );
            return false;
        }

        let Some(dictionary) = self.cache.get(&path).await else {
            return false;
        };

        let stale = {
            let mut state = self.lock_state();
            if state.generation(language) != generation {
                true
            } else {
                if state
                    .loaded
                    .insert((language.to_string(), namespace.to_string()))
                {
                    self.store.add_namespace(language, namespace, &dictionary);
                }
                false
            }
        };

        if stale {
            debug!(
                "Discarding {}.{}: language was evicted while loading",
                language, namespace
            );
            self.cache.invalidate(|cached| cached == path);
        }
        true
    }

    /// Eviction count of `language`. Changes every time it is evicted.
    pub fn generation(&self, language: &str) -> u64 {
        self.lock_state().generation(language)
    }

    pub fn is_loaded(&self, language: &str, namespace: &str) -> bool {
        self.lock_state()
            .loaded
            .contains(&(language.to_string(), namespace.to_string()))
    }

    /// Drop everything held for `language`: store dictionaries, load
    /// bookkeeping and cached fetches of its registered paths.
    pub fn evict_language(&self, language: &str) {
        {
            let mut state = self.lock_state();
            *state.generations.entry(language.to_string()).or_insert(0) += 1;
            state.loaded.retain(|(loaded_language, _)| loaded_language != language);
            self.store.remove_language(language);
        }

        let prefix = format!("{}.", language);
        let language_paths: HashSet<String> = self
            .paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, path)| path.clone())
            .collect();

        let removed = self.cache.invalidate(|path| language_paths.contains(path));
        debug!(
            "Evicted language {} ({} cached fetches dropped)",
            language, removed
        );
    }

    /// Wait until every preload started so far has finished.
    pub async fn wait_for_preloads(&self) {
        let pending: Vec<Preload> = {
            let mut preloads = self.preloads.lock().unwrap_or_else(PoisonError::into_inner);
            preloads.retain(|preload| preload.peek().is_none());
            preloads.clone()
        };

        if !pending.is_empty() {
            debug!("Waiting for {} preload(s) to finish", pending.len());
            join_all(pending).await;
        }
    }

    pub fn metrics(&self) -> &FetchMetrics {
        self.cache.metrics()
    }

    fn start_preload(self: &Arc<Self>, targets: Vec<(String, String)>) {
        debug!("Preloading {} namespace(s)", targets.len());

        let loader = Arc::clone(self);
        let preload = async move {
            join_all(
                targets
                    .iter()
                    .map(|(language, namespace)| loader.ensure_loaded(language, namespace)),
            )
            .await;
        };

        let preload: Preload = match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(preload);
                async move {
                    let _ = task.await;
                }
                .boxed()
                .shared()
            }
            Err(_) => preload.boxed().shared(),
        };

        let mut preloads = self.preloads.lock().unwrap_or_else(PoisonError::into_inner);
        preloads.retain(|pending| pending.peek().is_none());
        preloads.push(preload);
    }

    fn report_missing_file(&self, namespace: &str, language: &str) {
        if let Some(handler) = &self.missing_file_handler {
            handler(namespace, language);
        } else if self.enable_logging {
            error!(
                "File with namespace {} not found for language {}",
                namespace, language
            );
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Dictionary, FetchError, Fetcher};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, path: &str) -> Result<Dictionary, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match path {
                "missing.json" => Err(FetchError::Status {
                    path: path.to_string(),
                    status: 404,
                }),
                _ => {
                    let mut dictionary = Dictionary::new();
                    dictionary.insert("source".to_string(), json!(path));
                    Ok(dictionary)
                }
            }
        }
    }

    struct Fixture {
        loader: Arc<NamespaceLoader>,
        store: Arc<MemoryStore>,
        fetcher: Arc<StaticFetcher>,
        missing: Arc<Mutex<Vec<(String, String)>>>,
    }

    fn fixture(delay: Duration) -> Fixture {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
            delay,
        });
        let store = Arc::new(MemoryStore::new());
        let missing = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&missing);
        let handler: MissingFileHandler = Arc::new(move |namespace: &str, language: &str| {
            sink.lock()
                .unwrap()
                .push((namespace.to_string(), language.to_string()));
        });

        let loader = Arc::new(NamespaceLoader::new(
            FetchCache::new(fetcher.clone()),
            store.clone(),
            Some(handler),
            false,
        ));

        Fixture {
            loader,
            store,
            fetcher,
            missing,
        }
    }

    // ==================== ensure_loaded Tests ====================

    #[tokio::test]
    async fn test_loads_registered_namespace_into_store() {
        let f = fixture(Duration::ZERO);
        f.loader.add_paths([("en.common", "en/common.json")], false, "en");

        assert!(f.loader.ensure_loaded("en", "common").await);
        assert!(f.loader.is_loaded("en", "common"));
        assert_eq!(
            f.store.get_value("common.source", "en").unwrap()(None),
            "en/common.json"
        );
    }

    #[tokio::test]
    async fn test_not_found_leaves_store_untouched() {
        let f = fixture(Duration::ZERO);
        f.loader.add_paths([("cy.common", "missing.json")], false, "en");

        assert!(!f.loader.ensure_loaded("cy", "common").await);
        assert!(!f.loader.is_loaded("cy", "common"));
        assert!(f.store.languages().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_path_notifies_every_time_without_fetching() {
        let f = fixture(Duration::ZERO);

        assert!(!f.loader.ensure_loaded("en", "test").await);
        assert!(!f.loader.ensure_loaded("en", "test").await);

        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            *f.missing.lock().unwrap(),
            vec![
                ("test".to_string(), "en".to_string()),
                ("test".to_string(), "en".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_late_registration_takes_effect() {
        let f = fixture(Duration::ZERO);

        assert!(!f.loader.ensure_loaded("en", "late").await);
        f.loader.add_paths([("en.late", "en/late.json")], false, "en");
        assert!(f.loader.ensure_loaded("en", "late").await);
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let f = fixture(Duration::from_millis(20));
        f.loader.add_paths([("en.common", "en/common.json")], false, "en");

        let results = join_all((0..5).map(|_| f.loader.ensure_loaded("en", "common"))).await;

        assert!(results.into_iter().all(|found| found));
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    // ==================== Eviction Tests ====================

    #[tokio::test]
    async fn test_eviction_forces_refetch() {
        let f = fixture(Duration::ZERO);
        f.loader.add_paths(
            [("cy.common", "cy/common.json"), ("en.common", "en/common.json")],
            false,
            "en",
        );
        f.loader.ensure_loaded("cy", "common").await;
        f.loader.ensure_loaded("en", "common").await;

        f.loader.evict_language("cy");

        assert!(!f.loader.is_loaded("cy", "common"));
        assert!(f.loader.is_loaded("en", "common"));
        assert_eq!(f.store.languages(), vec!["en"]);

        f.loader.ensure_loaded("cy", "common").await;
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(f.loader.is_loaded("cy", "common"));
    }

    #[tokio::test]
    async fn test_in_flight_load_does_not_repopulate_evicted_language() {
        let f = fixture(Duration::from_millis(30));
        f.loader.add_paths([("cy.common", "cy/common.json")], false, "en");

        let loader = Arc::clone(&f.loader);
        let load = tokio::spawn(async move { loader.ensure_loaded("cy", "common").await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        f.loader.evict_language("cy");

        assert!(load.await.unwrap());
        assert!(!f.loader.is_loaded("cy", "common"));
        assert!(f.store.languages().is_empty());
    }

    #[tokio::test]
    async fn test_load_for_evicted_generation_is_skipped() {
        let f = fixture(Duration::ZERO);
        f.loader.add_paths([("en.common", "en/common.json")], false, "en");
        let before = f.loader.generation("en");

        f.loader.evict_language("en");

        assert!(!f.loader.ensure_loaded_as_of("en", "common", before).await);
        assert!(!f.loader.is_loaded("en", "common"));
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(f.store.languages().is_empty());
    }

    #[tokio::test]
    async fn test_stale_fetch_is_not_left_in_cache() {
        let f = fixture(Duration::from_millis(30));
        f.loader.add_paths([("cy.common", "cy/common.json")], false, "en");

        let loader = Arc::clone(&f.loader);
        let load = tokio::spawn(async move { loader.ensure_loaded("cy", "common").await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        f.loader.evict_language("cy");
        load.await.unwrap();

        f.loader.ensure_loaded("cy", "common").await;
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(f.loader.is_loaded("cy", "common"));
    }

    // ==================== Preload Tests ====================

    #[tokio::test]
    async fn test_preload_only_loads_active_language() {
        let f = fixture(Duration::from_millis(10));
        f.loader.add_paths(
            [("en.common", "en/common.json"), ("cy.common", "cy/common.json")],
            true,
            "en",
        );

        f.loader.wait_for_preloads().await;

        assert!(f.loader.is_loaded("en", "common"));
        assert!(!f.loader.is_loaded("cy", "common"));
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_for_preloads_with_nothing_pending() {
        let f = fixture(Duration::ZERO);
        f.loader.wait_for_preloads().await;
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registering_same_path_twice_is_idempotent() {
        let f = fixture(Duration::ZERO);
        f.loader.add_paths([("en.common", "en/common.json")], true, "en");
        f.loader.add_paths([("en.common", "en/common.json")], true, "en");
        f.loader.wait_for_preloads().await;

        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.key_count("en"), 1);
        assert_eq!(
            f.loader.path_for("en", "common").as_deref(),
            Some("en/common.json")
        );
    }
}
