//! Dictionary store: parsed key -> template mappings per language.
//!
//! The translator treats the store as opaque; it only adds whole namespaces,
//! asks for a value by full key, and drops whole languages. [`MemoryStore`] is
//! the stock implementation.

use crate::fetch::Dictionary;
use crate::params::{display_value, Params};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// A resolved template. Call it with flattened parameters to get the final
/// string.
pub type TranslationValue = Arc<dyn Fn(Option<&Params>) -> String + Send + Sync>;

/// Storage for loaded dictionaries.
pub trait TranslationStore: Send + Sync + 'static {
    /// Add the dictionary for `(language, namespace)`.
    fn add_namespace(&self, language: &str, namespace: &str, dictionary: &Dictionary);

    /// Look up a full key (`"<namespace>.<path>"`) in `language`.
    fn get_value(&self, key: &str, language: &str) -> Option<TranslationValue>;

    /// Drop every dictionary held for `language`.
    fn remove_language(&self, language: &str);
}

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

/// In-memory store.
///
/// Nested dictionary objects are addressed with dotted paths, so
/// `{"greeting": {"hello": "Hi"}}` loaded as namespace `common` answers
/// `common.greeting.hello`. String leaves are templates with `{{ name }}`
/// placeholders; numbers and booleans are stored as their text.
#[derive(Default)]
pub struct MemoryStore {
    languages: RwLock<HashMap<String, HashMap<String, Arc<str>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Languages that currently hold at least one namespace.
    pub fn languages(&self) -> Vec<String> {
        let languages = self.languages.read().unwrap_or_else(PoisonError::into_inner);
        let mut codes: Vec<String> = languages.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Number of keys held for `language`.
    pub fn key_count(&self, language: &str) -> usize {
        self.languages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language)
            .map_or(0, HashMap::len)
    }
}

impl TranslationStore for MemoryStore {
    fn add_namespace(&self, language: &str, namespace: &str, dictionary: &Dictionary) {
        let mut entries = Vec::new();
        collect_templates(namespace, dictionary, &mut entries);
        debug!(
            "Storing {} keys for {}.{}",
            entries.len(),
            language,
            namespace
        );

        let mut languages = self.languages.write().unwrap_or_else(PoisonError::into_inner);
        let keys = languages.entry(language.to_string()).or_default();
        keys.extend(entries);
    }

    fn get_value(&self, key: &str, language: &str) -> Option<TranslationValue> {
        let template = self
            .languages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language)?
            .get(key)?
            .clone();

        Some(Arc::new(move |params: Option<&Params>| {
            interpolate(&template, params)
        }))
    }

    fn remove_language(&self, language: &str) {
        let removed = self
            .languages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(language);

        if removed.is_some() {
            debug!("Removed dictionaries for language {}", language);
        }
    }
}

fn collect_templates(prefix: &str, dictionary: &Dictionary, out: &mut Vec<(String, Arc<str>)>) {
    for (name, value) in dictionary {
        let key = format!("{}.{}", prefix, name);
        match value {
            Value::Object(nested) => collect_templates(&key, nested, out),
            Value::String(s) => out.push((key, Arc::from(s.as_str()))),
            Value::Number(n) => out.push((key, Arc::from(n.to_string().as_str()))),
            Value::Bool(b) => out.push((key, Arc::from(b.to_string().as_str()))),
            Value::Null | Value::Array(_) => {}
        }
    }
}

/// Replace `{{ name }}` placeholders with parameter values. Unknown
/// placeholders are left as written.
pub fn interpolate(template: &str, params: Option<&Params>) -> String {
    let Some(params) = params else {
        return template.to_string();
    };

    let regex = PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_$.-]+)\s*\}\}").expect("placeholder pattern is valid")
    });

    regex
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}
