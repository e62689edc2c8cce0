//! Error types surfaced by the translation engine.
//!
//! Most runtime conditions (missing files, transport failures, unknown
//! language codes) are deliberately *not* errors: they degrade to "not found"
//! or are coerced to a valid value. Only caller mistakes reach this enum.

use thiserror::Error;

/// Errors reported to callers of the public API.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// An interpolation string handed to a binding could not be parsed into
    /// a parameter object.
    #[error("Incorrect parameter in translate binding. Expected a valid Object, received: {input}")]
    InvalidParams { input: String },

    /// A binding was created outside of a tokio runtime.
    #[error("translate binding requires a running tokio runtime")]
    NoRuntime,

    /// The supplied configuration is inconsistent.
    #[error("invalid translate configuration: {0}")]
    Config(String),
}
