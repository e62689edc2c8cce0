//! Language registry: the immutable set of languages a translator supports.
//!
//! The registry is built once from configuration and never changes afterwards.
//! It is also the authority on which language codes are valid: every external
//! language assignment is normalised through [`LanguageRegistry::validate_code`].

use serde::{Deserialize, Serialize};

/// A supported language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    /// Language code used in asset path keys (e.g., "en", "cy", "pt-BR")
    pub code: String,

    /// Human readable name shown in language pickers (e.g., "Cymraeg")
    pub display_value: String,
}

impl Language {
    pub fn new(code: impl Into<String>, display_value: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_value: display_value.into(),
        }
    }
}

/// Registry of supported languages plus the configured default language.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
    default_code: String,
}

impl LanguageRegistry {
    /// Create a registry.
    ///
    /// `default_code` is expected to be one of `languages`; callers validate
    /// that through `Config::validate` before building a translator.
    pub fn new(languages: Vec<Language>, default_code: impl Into<String>) -> Self {
        Self {
            languages,
            default_code: default_code.into(),
        }
    }

    /// Get a language by its code.
    ///
    /// # Returns
    /// * `Some(&Language)` if the code is registered
    /// * `None` otherwise
    pub fn get_by_code(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Check whether a code is registered verbatim.
    pub fn contains(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }

    /// All registered languages, in configuration order.
    pub fn list_all(&self) -> &[Language] {
        &self.languages
    }

    /// The configured default language code.
    pub fn default_code(&self) -> &str {
        &self.default_code
    }

    /// Normalise a candidate code to a registered one.
    ///
    /// An exact match is accepted. Otherwise a region suffix is stripped
    /// (`cy-GB` -> `cy`) and the shorter code retried. Anything else becomes
    /// the default language. This never fails.
    ///
    /// Only the last subtag is removed per step, so a registered intermediate
    /// tag wins: `zh-Hant-TW` becomes `zh-Hant` when that is registered, and
    /// only falls through to `zh` when it is not.
    pub fn validate_code(&self, code: &str) -> String {
        if self.contains(code) {
            return code.to_string();
        }

        if let Some((base, _region)) = code.rsplit_once('-') {
            return self.validate_code(base);
        }

        self.default_code.clone()
    }
}
