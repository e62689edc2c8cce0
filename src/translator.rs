//! The translator: namespace-aware key resolution with default-language
//! fallback over lazily loaded dictionaries.

use crate::cache::FetchCache;
use crate::config::{detect_runtime_locale, Config, MissingTranslationHandler, ParamsPolicy};
use crate::error::TranslateError;
use crate::fetch::Fetcher;
use crate::i18n::{
    FetchMetrics, Language, LanguageChange, LanguageRegistry, LanguageState, Subscription,
};
use crate::loader::NamespaceLoader;
use crate::params::{flatten_params, Params};
use crate::store::{TranslationStore, TranslationValue};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Resolves translation keys for the active language.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Translator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<LanguageRegistry>,
    state: LanguageState,
    loader: Arc<NamespaceLoader>,
    store: Arc<dyn TranslationStore>,
    use_default_language: bool,
    enable_logging: bool,
    params_policy: ParamsPolicy,
    missing_translation_handler: Option<MissingTranslationHandler>,
}

impl Translator {
    /// Build a translator.
    ///
    /// The active language starts at `config.locale`, or the process locale,
    /// or the default language, validated against the registry. Initial asset
    /// paths are registered (and preloaded when `config.preload` is set).
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn TranslationStore>,
    ) -> Result<Self, TranslateError> {
        config.validate()?;

        let registry = Arc::new(LanguageRegistry::new(
            config.languages.clone(),
            config.default_language.clone(),
        ));

        let loader = Arc::new(NamespaceLoader::new(
            FetchCache::new(fetcher),
            Arc::clone(&store),
            config.missing_file_handler.clone(),
            config.enable_logging,
        ));

        let initial = config
            .locale
            .clone()
            .or_else(detect_runtime_locale)
            .unwrap_or_else(|| config.default_language.clone());

        let evicting = Arc::clone(&loader);
        let state = LanguageState::new(
            Arc::clone(&registry),
            &initial,
            config.enable_logging,
            move |language| evicting.evict_language(language),
        );

        loader.add_paths(
            config.translation_asset_paths.clone(),
            config.preload,
            &state.active(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                state,
                loader,
                store,
                use_default_language: config.use_default_language,
                enable_logging: config.enable_logging,
                params_policy: config.params_policy,
                missing_translation_handler: config.missing_translation_handler,
            }),
        })
    }

    // ==================== Languages ====================

    /// All supported languages, in configuration order.
    pub fn languages(&self) -> &[Language] {
        self.inner.registry.list_all()
    }

    pub fn language(&self) -> String {
        self.inner.state.active()
    }

    pub fn default_language(&self) -> String {
        self.inner.state.default_language()
    }

    /// Switch the active language. Unknown codes are coerced (`cy-GB` ->
    /// `cy`, anything unregistered -> the default language).
    pub fn set_language(&self, code: &str) -> Option<LanguageChange> {
        self.inner.state.set_active(code)
    }

    /// Switch the fallback language. Validated like [`set_language`](Self::set_language).
    pub fn set_default_language(&self, code: &str) -> Option<LanguageChange> {
        self.inner.state.set_default(code)
    }

    /// Stream of the active language.
    pub fn watch_language(&self) -> watch::Receiver<String> {
        self.inner.state.watch_active()
    }

    /// Stream of the default language.
    pub fn watch_default_language(&self) -> watch::Receiver<String> {
        self.inner.state.watch_default()
    }

    /// Observe language changes. The callback runs synchronously inside the
    /// setter, after any eviction the change caused.
    pub fn on_language_change(
        &self,
        callback: impl Fn(&LanguageChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.on_change(callback)
    }

    // ==================== Assets ====================

    /// Register more asset paths keyed by `"<language>.<namespace>"`.
    /// Re-registering an existing key is harmless.
    pub fn add_translation_paths<I, K, V>(&self, paths: I, preload: bool)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner
            .loader
            .add_paths(paths, preload, &self.inner.state.active());
    }

    /// Whether a namespace's dictionary is currently held for `language`.
    pub fn is_loaded(&self, language: &str, namespace: &str) -> bool {
        self.inner.loader.is_loaded(language, namespace)
    }

    pub fn metrics(&self) -> &FetchMetrics {
        self.inner.loader.metrics()
    }

    pub fn params_policy(&self) -> ParamsPolicy {
        self.inner.params_policy
    }

    // ==================== Resolution ====================

    /// Resolve `key` (`"<namespace>.<path>"`) to a template.
    ///
    /// Waits for any pending preload, then loads the key's namespace for the
    /// active language. If the active language has no such file, or the key
    /// is missing from it, and fallback is enabled, the default language is
    /// consulted. Returns `None` when neither has the key.
    pub async fn resolve(&self, key: &str) -> Option<TranslationValue> {
        let inner = &self.inner;
        inner.loader.wait_for_preloads().await;

        let namespace = key.split_once('.').map_or(key, |(namespace, _)| namespace);
        // Generations are read with the pair so that a language evicted
        // while this resolution waits is never loaded again by it.
        let (language, default, language_generation, default_generation) =
            inner.state.snapshot_with(|active, default| {
                (
                    active.to_string(),
                    default.to_string(),
                    inner.loader.generation(active),
                    inner.loader.generation(default),
                )
            });
        let fallback = inner.use_default_language && language != default;

        let found = inner
            .loader
            .ensure_loaded_as_of(&language, namespace, language_generation)
            .await;
        if !found && fallback {
            inner
                .loader
                .ensure_loaded_as_of(&default, namespace, default_generation)
                .await;
        }

        if let Some(value) = inner.store.get_value(key, &language) {
            return Some(value);
        }

        if fallback {
            inner
                .loader
                .ensure_loaded_as_of(&default, namespace, default_generation)
                .await;
            if let Some(value) = inner.store.get_value(key, &default) {
                debug!("Key {} resolved from default language {}", key, default);
                return Some(value);
            }
        }

        self.report_missing_translation(key, &language);
        None
    }

    /// Resolve and render `key`.
    ///
    /// Parameters are flattened before substitution. When the key cannot be
    /// resolved the result is `default_value`, or the key itself.
    pub async fn translate(
        &self,
        key: &str,
        params: Option<&Params>,
        default_value: Option<&str>,
    ) -> String {
        match self.resolve(key).await {
            Some(value) => value(flatten_params(params).as_ref()),
            None => default_value.unwrap_or(key).to_string(),
        }
    }

    fn report_missing_translation(&self, key: &str, language: &str) {
        if let Some(handler) = &self.inner.missing_translation_handler {
            handler(key, language);
        } else if self.inner.enable_logging {
            warn!(
                "Missing translation for key {} in language {}",
                key, language
            );
        }
    }
}
