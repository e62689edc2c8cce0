//! Reactive binding: keeps one rendered translation current for a changing
//! `(key, params, default)` input and for language changes.
//!
//! Only the most recent input matters. A resolution started for an older
//! input, or before the latest language change, is discarded when it
//! finishes. Identical consecutive inputs do not start anything.

use crate::config::ParamsPolicy;
use crate::error::TranslateError;
use crate::i18n::Subscription;
use crate::params::{parse_params, Params};
use crate::translator::Translator;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::debug;

/// Interpolation argument: an object, or text in relaxed object syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamsArg {
    Object(Params),
    Text(String),
}

impl From<Params> for ParamsArg {
    fn from(params: Params) -> Self {
        ParamsArg::Object(params)
    }
}

impl From<&str> for ParamsArg {
    fn from(text: &str) -> Self {
        ParamsArg::Text(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BindingInput {
    key: Option<String>,
    params: Option<Params>,
    default_value: Option<String>,
}

#[derive(Default)]
struct BindingState {
    last_input: Option<BindingInput>,
    value: Option<String>,
    generation: u64,
    torn_down: bool,
}

struct Shared {
    translator: Translator,
    runtime: Handle,
    state: Mutex<BindingState>,
    // Held while checking a result and notifying, so notifications keep
    // generation order.
    emit: Mutex<()>,
    on_value: Box<dyn Fn(&str) + Send + Sync>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>, key: String, input: BindingInput, generation: u64) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let value = shared
                .translator
                .translate(&key, input.params.as_ref(), input.default_value.as_deref())
                .await;
            shared.apply(generation, value);
        });
    }

    fn apply(&self, generation: u64, value: String) {
        let _emit = self.emit.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.lock_state();
            if state.torn_down || state.generation != generation {
                debug!("Discarding superseded translation result");
                return;
            }
            if state.value.as_deref() == Some(value.as_str()) {
                return;
            }
            state.value = Some(value.clone());
        }
        (self.on_value)(&value);
    }

    fn refresh(self: &Arc<Self>) {
        let (key, input, generation) = {
            let mut state = self.lock_state();
            if state.torn_down {
                return;
            }
            let Some(input) = state.last_input.clone() else {
                return;
            };
            let Some(key) = input.key.clone() else {
                return;
            };
            state.generation += 1;
            (key, input, state.generation)
        };

        debug!("Language changed, re-resolving {}", key);
        self.start(key, input, generation);
    }
}

/// A single translated value bound to a key.
///
/// `on_value` is called with every new rendering, from a runtime worker.
/// It must not block on the binding itself, nor destroy it.
pub struct TranslateBinding {
    shared: Arc<Shared>,
    policy: ParamsPolicy,
    subscription: Option<Subscription>,
}

impl TranslateBinding {
    /// Create a binding on the current tokio runtime.
    pub fn new(
        translator: &Translator,
        on_value: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self, TranslateError> {
        let runtime = Handle::try_current().map_err(|_| TranslateError::NoRuntime)?;

        let shared = Arc::new(Shared {
            translator: translator.clone(),
            runtime,
            state: Mutex::new(BindingState::default()),
            emit: Mutex::new(()),
            on_value: Box::new(on_value),
        });

        let weak = Arc::downgrade(&shared);
        let subscription = translator.on_language_change(move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.refresh();
            }
        });

        Ok(Self {
            shared,
            policy: translator.params_policy(),
            subscription: Some(subscription),
        })
    }

    /// Feed a new input and return the current value.
    ///
    /// The returned value is whatever was last rendered; the rendering for
    /// this input arrives later through `on_value`. A `None` key cancels any
    /// pending resolution and keeps the previous value.
    pub fn transform(
        &self,
        key: Option<&str>,
        params: Option<ParamsArg>,
        default_value: Option<&str>,
    ) -> Result<Option<String>, TranslateError> {
        let (params, default_value) = self.normalize(params, default_value)?;
        let input = BindingInput {
            key: key.map(str::to_string),
            params,
            default_value,
        };

        let generation = {
            let mut state = self.shared.lock_state();
            if state.torn_down || state.last_input.as_ref() == Some(&input) {
                return Ok(state.value.clone());
            }
            state.last_input = Some(input.clone());
            state.generation += 1;
            state.generation
        };

        if let Some(key) = input.key.clone() {
            self.shared.start(key, input, generation);
        }

        Ok(self.value())
    }

    /// The last rendered value.
    pub fn value(&self) -> Option<String> {
        self.shared.lock_state().value.clone()
    }

    /// Stop reacting. Pending results are discarded and no further
    /// notifications are delivered once this returns; a notification already
    /// being delivered is waited for. Must not be called from `on_value`.
    pub fn destroy(&mut self) {
        {
            let _emit = self.shared.emit.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.lock_state().torn_down = true;
        }
        self.subscription.take();
    }

    fn normalize(
        &self,
        params: Option<ParamsArg>,
        default_value: Option<&str>,
    ) -> Result<(Option<Params>, Option<String>), TranslateError> {
        let default_value = default_value.map(str::to_string);

        match params {
            None => Ok((None, default_value)),
            Some(ParamsArg::Object(params)) => Ok((Some(params), default_value)),
            Some(ParamsArg::Text(text)) => match parse_params(&text) {
                Some(params) => Ok((Some(params), default_value)),
                None => match self.policy {
                    ParamsPolicy::Strict => Err(TranslateError::InvalidParams { input: text }),
                    ParamsPolicy::Lenient => Ok((None, default_value.or(Some(text)))),
                },
            },
        }
    }
}

impl Drop for TranslateBinding {
    fn drop(&mut self) {
        self.destroy();
    }
}
