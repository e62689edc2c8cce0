use crate::error::TranslateError;
use crate::i18n::Language;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Initial asset paths, keyed by `"<language>.<namespace>"`.
pub type AssetPaths = BTreeMap<String, String>;

/// Called with `(key, language)` when a resolution ends without a value.
pub type MissingTranslationHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Called with `(namespace, language)` when no asset path is registered.
pub type MissingFileHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// What a binding does with an interpolation string that is not an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamsPolicy {
    /// Report `TranslateError::InvalidParams`.
    #[default]
    Strict,
    /// Treat the string as the default value.
    Lenient,
}

impl FromStr for ParamsPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ParamsPolicy::Strict),
            "lenient" => Ok(ParamsPolicy::Lenient),
            other => bail!("unknown params policy '{}' (expected strict or lenient)", other),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Languages
    pub languages: Vec<Language>,
    pub default_language: String,
    pub locale: Option<String>,

    // Assets
    pub translation_asset_paths: AssetPaths,
    pub preload: bool,

    // Behaviour
    pub use_default_language: bool,
    pub enable_logging: bool,
    pub params_policy: ParamsPolicy,

    // Notifications
    pub missing_translation_handler: Option<MissingTranslationHandler>,
    pub missing_file_handler: Option<MissingFileHandler>,
}

impl Config {
    pub fn new(languages: Vec<Language>, default_language: impl Into<String>) -> Self {
        Self {
            languages,
            default_language: default_language.into(),
            locale: None,
            translation_asset_paths: AssetPaths::new(),
            preload: false,
            use_default_language: true,
            enable_logging: true,
            params_policy: ParamsPolicy::default(),
            missing_translation_handler: None,
            missing_file_handler: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Register initial asset paths. With `preload`, the active language's
    /// namespaces start loading as soon as the translator is built.
    pub fn with_asset_paths<I, K, V>(mut self, paths: I, preload: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.translation_asset_paths
            .extend(paths.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.preload = preload;
        self
    }

    pub fn with_use_default_language(mut self, enabled: bool) -> Self {
        self.use_default_language = enabled;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_params_policy(mut self, policy: ParamsPolicy) -> Self {
        self.params_policy = policy;
        self
    }

    pub fn with_missing_translation_handler(
        mut self,
        handler: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.missing_translation_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_missing_file_handler(
        mut self,
        handler: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.missing_file_handler = Some(Arc::new(handler));
        self
    }

    /// Check that the registry is usable.
    pub fn validate(&self) -> Result<(), TranslateError> {
        if self.languages.is_empty() {
            return Err(TranslateError::Config("no languages configured".to_string()));
        }

        if !self
            .languages
            .iter()
            .any(|lang| lang.code == self.default_language)
        {
            return Err(TranslateError::Config(format!(
                "default language '{}' is not one of the configured languages",
                self.default_language
            )));
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self> {
        let languages = parse_languages(
            &std::env::var("TRANSLATE_LANGUAGES").context("TRANSLATE_LANGUAGES not set")?,
        )?;
        let default_language = std::env::var("TRANSLATE_DEFAULT_LANGUAGE")
            .context("TRANSLATE_DEFAULT_LANGUAGE not set")?;

        let translation_asset_paths = match std::env::var("TRANSLATE_ASSET_MANIFEST") {
            Ok(path) => load_manifest(&path)?,
            Err(_) => AssetPaths::new(),
        };

        let params_policy = match std::env::var("TRANSLATE_PARAMS_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => ParamsPolicy::default(),
        };

        let config = Self {
            languages,
            default_language,
            locale: std::env::var("TRANSLATE_LOCALE").ok(),
            translation_asset_paths,
            preload: env_flag("TRANSLATE_PRELOAD", false),
            use_default_language: env_flag("TRANSLATE_USE_DEFAULT_LANGUAGE", true),
            enable_logging: env_flag("TRANSLATE_ENABLE_LOGGING", true),
            params_policy,
            missing_translation_handler: None,
            missing_file_handler: None,
        };

        config.validate()?;
        Ok(config)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("languages", &self.languages)
            .field("default_language", &self.default_language)
            .field("locale", &self.locale)
            .field("translation_asset_paths", &self.translation_asset_paths)
            .field("preload", &self.preload)
            .field("use_default_language", &self.use_default_language)
            .field("enable_logging", &self.enable_logging)
            .field("params_policy", &self.params_policy)
            .field(
                "missing_translation_handler",
                &self.missing_translation_handler.is_some(),
            )
            .field("missing_file_handler", &self.missing_file_handler.is_some())
            .finish()
    }
}

/// Parse `"en:English,cy:Cymraeg"`. A bare code uses itself as display name.
fn parse_languages(value: &str) -> Result<Vec<Language>> {
    let languages: Vec<Language> = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((code, name)) => Language::new(code.trim(), name.trim()),
            None => Language::new(entry, entry),
        })
        .collect();

    if languages.is_empty() {
        bail!("TRANSLATE_LANGUAGES is empty");
    }
    Ok(languages)
}

fn load_manifest(path: &str) -> Result<AssetPaths> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read asset manifest {}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Asset manifest {} is not a JSON object of strings", path))
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Locale of the process environment, as a language tag (`cy_GB.UTF-8` ->
/// `cy-GB`). `C` and `POSIX` count as unset.
pub fn detect_runtime_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find_map(|value| normalize_locale(&value))
}

fn normalize_locale(value: &str) -> Option<String> {
    let tag = value
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-");

    match tag.as_str() {
        "" | "C" | "POSIX" => None,
        _ => Some(tag),
    }
}
