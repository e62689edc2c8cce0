//! Language handling for the translation engine.
//!
//! # Architecture
//!
//! - `registry`: the immutable set of supported languages and code validation
//! - `state`: active/default language values, change observers and eviction
//! - `metrics`: fetch cache counters
//!
//! # Example
//!
//! ```rust,ignore
//! use lazy_translate::i18n::{Language, LanguageRegistry};
//!
//! let registry = LanguageRegistry::new(
//!     vec![Language::new("en", "English"), Language::new("cy", "Cymraeg")],
//!     "en",
//! );
//! assert_eq!(registry.validate_code("cy-GB"), "cy");
//! ```

mod metrics;
mod registry;
mod state;

pub use metrics::{FetchMetrics, MetricsReport};
pub use registry::{Language, LanguageRegistry};
pub use state::{LanguageChange, LanguageKind, LanguageState, Subscription};
