//! Lazily loaded, namespaced translation dictionaries.
//!
//! Keys look like `"<namespace>.<path>"`. The first lookup in a namespace
//! fetches that namespace's dictionary for the active language (and, when
//! needed, the default language), concurrent lookups share a single fetch,
//! and dictionaries of languages that fall out of use are evicted.
//!
//! ```rust,ignore
//! use lazy_translate::{Config, HttpFetcher, Language, MemoryStore, Translator};
//! use std::sync::Arc;
//!
//! let config = Config::new(
//!     vec![Language::new("en", "English"), Language::new("cy", "Cymraeg")],
//!     "en",
//! )
//! .with_asset_paths([("en.common", "en/common.json"), ("cy.common", "cy/common.json")], false);
//!
//! let translator = Translator::new(
//!     config,
//!     Arc::new(HttpFetcher::new("https://example.com/assets/i18n")?),
//!     Arc::new(MemoryStore::new()),
//! )?;
//! translator.set_language("cy");
//! let text = translator.translate("common.title", None, None).await;
//! ```

pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod i18n;
pub mod loader;
pub mod params;
pub mod retry;
pub mod store;
pub mod translator;

pub use binding::{ParamsArg, TranslateBinding};
pub use config::{Config, ParamsPolicy};
pub use error::TranslateError;
pub use fetch::{Dictionary, FetchError, Fetcher, HttpFetcher};
pub use i18n::{Language, LanguageChange, MetricsReport, Subscription};
pub use params::{flatten_params, parse_params, Params};
pub use store::{MemoryStore, TranslationStore, TranslationValue};
pub use translator::Translator;
