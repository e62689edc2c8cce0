//! Language state: the active and default language as observable values.
//!
//! Both values are always registered codes. Every assignment goes through
//! [`LanguageRegistry::validate_code`], so invalid input is coerced rather
//! than rejected.
//!
//! A language stays "in use" while it is either the active or the default
//! language. When a change drops the previous value out of use, the eviction
//! hook fires exactly once for it, before observers are told about the change.

use crate::i18n::LanguageRegistry;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info};

/// Which of the two language values changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    Active,
    Default,
}

/// A single change of the active or default language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageChange {
    pub kind: LanguageKind,
    pub previous: String,
    pub current: String,
    /// The previous value, when it is no longer active nor default.
    pub evicted: Option<String>,
}

type Observer = Arc<dyn Fn(&LanguageChange) + Send + Sync>;
type EvictionHook = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct ObserverList {
    next_id: u64,
    entries: Vec<(u64, Observer)>,
}

/// Handle returned by [`LanguageState::on_change`]. Dropping it unregisters
/// the observer.
#[must_use = "dropping a Subscription unregisters the observer immediately"]
pub struct Subscription {
    observers: Weak<Mutex<ObserverList>>,
    id: u64,
}

impl Subscription {
    /// Unregister explicitly; equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            let mut list = observers.lock().unwrap_or_else(PoisonError::into_inner);
            list.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Current and default language, with eviction bookkeeping.
pub struct LanguageState {
    registry: Arc<LanguageRegistry>,
    active: watch::Sender<String>,
    default: watch::Sender<String>,
    // Serialises read-compare-write across the two values.
    transition: Mutex<()>,
    observers: Arc<Mutex<ObserverList>>,
    on_evict: EvictionHook,
    log_changes: bool,
}

impl LanguageState {
    /// Create the state.
    ///
    /// `initial_active` is typically the runtime locale; it is validated like
    /// any other assignment. The default language is the registry's default.
    pub fn new(
        registry: Arc<LanguageRegistry>,
        initial_active: &str,
        log_changes: bool,
        on_evict: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        let active = registry.validate_code(initial_active);
        let default = registry.validate_code(registry.default_code());

        if log_changes {
            info!("Current language: {}", active);
        }

        Self {
            registry,
            active: watch::channel(active).0,
            default: watch::channel(default).0,
            transition: Mutex::new(()),
            observers: Arc::new(Mutex::new(ObserverList::default())),
            on_evict: Box::new(on_evict),
            log_changes,
        }
    }

    pub fn active(&self) -> String {
        self.active.borrow().clone()
    }

    pub fn default_language(&self) -> String {
        self.default.borrow().clone()
    }

    /// Snapshot of `(active, default)` taken under the transition lock, so the
    /// pair is never torn by a concurrent setter.
    pub fn snapshot(&self) -> (String, String) {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        (self.active(), self.default_language())
    }

    /// Run `f` on `(active, default)` under the transition lock. No eviction
    /// can happen while `f` runs, so anything it reads is consistent with
    /// the pair.
    pub fn snapshot_with<R>(&self, f: impl FnOnce(&str, &str) -> R) -> R {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        f(&self.active.borrow(), &self.default.borrow())
    }

    /// Value stream of the active language. The receiver observes the current
    /// value immediately and every subsequent change.
    pub fn watch_active(&self) -> watch::Receiver<String> {
        self.active.subscribe()
    }

    /// Value stream of the default language.
    pub fn watch_default(&self) -> watch::Receiver<String> {
        self.default.subscribe()
    }

    /// Set the active language. Returns the change, or `None` when the
    /// validated code equals the current value.
    pub fn set_active(&self, code: &str) -> Option<LanguageChange> {
        self.transition(LanguageKind::Active, code)
    }

    /// Set the default language. Returns the change, or `None` when the
    /// validated code equals the current value.
    pub fn set_default(&self, code: &str) -> Option<LanguageChange> {
        self.transition(LanguageKind::Default, code)
    }

    /// Register a synchronous observer, called after every change (and after
    /// any eviction that change caused).
    pub fn on_change(&self, observer: impl Fn(&LanguageChange) + Send + Sync + 'static) -> Subscription {
        let mut list = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push((id, Arc::new(observer)));

        Subscription {
            observers: Arc::downgrade(&self.observers),
            id,
        }
    }

    fn transition(&self, kind: LanguageKind, code: &str) -> Option<LanguageChange> {
        let code = self.registry.validate_code(code);

        let change = {
            let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);

            let (target, anchor) = match kind {
                LanguageKind::Active => (&self.active, &self.default),
                LanguageKind::Default => (&self.default, &self.active),
            };

            if *target.borrow() == code {
                return None;
            }

            let previous = target.send_replace(code.clone());
            let evicted = (previous != *anchor.borrow()).then(|| previous.clone());

            if let Some(language) = &evicted {
                debug!("Language {} is no longer in use, evicting", language);
                (self.on_evict)(language);
            }

            LanguageChange {
                kind,
                previous,
                current: code,
                evicted,
            }
        };

        if self.log_changes && kind == LanguageKind::Active {
            info!("Current language: {}", change.current);
        }

        self.notify(&change);
        Some(change)
    }

    fn notify(&self, change: &LanguageChange) {
        // Observers run without the list lock held so they may (un)subscribe.
        let observers: Vec<Observer> = {
            let list = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
            list.entries.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        for observer in observers {
            observer(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;

    fn registry() -> Arc<LanguageRegistry> {
        Arc::new(LanguageRegistry::new(
            vec![
                Language::new("en", "English"),
                Language::new("cy", "Cymraeg"),
                Language::new("fr", "Français"),
                Language::new("de", "Deutsch"),
            ],
            "en",
        ))
    }

    fn state_with_log(initial: &str) -> (LanguageState, Arc<Mutex<Vec<String>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let state = LanguageState::new(registry(), initial, false, move |lang| {
            sink.lock().unwrap().push(lang.to_string());
        });
        (state, evicted)
    }

    // ==================== Initialization Tests ====================

    #[test]
    fn test_initial_values_are_validated() {
        let (state, _) = state_with_log("cy-GB");
        assert_eq!(state.active(), "cy");
        assert_eq!(state.default_language(), "en");
    }

    #[test]
    fn test_unknown_initial_locale_falls_back_to_default() {
        let (state, _) = state_with_log("ja-JP");
        assert_eq!(state.active(), "en");
    }

    // ==================== Transition Tests ====================

    #[test]
    fn test_set_same_language_is_no_change() {
        let (state, evicted) = state_with_log("en");
        assert!(state.set_active("en").is_none());
        assert!(state.set_active("en-GB").is_none());
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_leaving_default_does_not_evict() {
        let (state, evicted) = state_with_log("en");
        let change = state.set_active("cy").unwrap();
        assert_eq!(change.previous, "en");
        assert_eq!(change.current, "cy");
        assert_eq!(change.evicted, None);
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_leaving_non_default_evicts_once() {
        let (state, evicted) = state_with_log("cy");
        state.set_active("fr");
        state.set_active("cy");
        assert_eq!(*evicted.lock().unwrap(), vec!["cy", "fr"]);
    }

    #[test]
    fn test_a_b_a_evicts_b() {
        let (state, evicted) = state_with_log("fr");
        state.set_active("de");
        state.set_active("fr");
        assert_eq!(*evicted.lock().unwrap(), vec!["fr", "de"]);
    }

    #[test]
    fn test_default_change_evicts_previous_default_unless_active() {
        let (state, evicted) = state_with_log("cy");
        let change = state.set_default("fr").unwrap();
        assert_eq!(change.kind, LanguageKind::Default);
        assert_eq!(change.evicted.as_deref(), Some("en"));

        state.set_active("fr");
        // cy left use: not default (fr)
        state.set_default("de");
        // fr is still active, so it is anchored
        assert_eq!(*evicted.lock().unwrap(), vec!["en", "cy"]);
    }

    #[test]
    fn test_invalid_code_is_coerced() {
        let (state, _) = state_with_log("cy");
        state.set_active("xx");
        assert_eq!(state.active(), "en");
    }

    // ==================== Observer Tests ====================

    #[test]
    fn test_observers_are_notified_after_eviction() {
        let (state, evicted) = state_with_log("cy");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let evicted_clone = Arc::clone(&evicted);

        let _sub = state.on_change(move |change| {
            let evicted_count = evicted_clone.lock().unwrap().len();
            seen_clone
                .lock()
                .unwrap()
                .push((change.current.clone(), evicted_count));
        });

        state.set_active("fr");
        assert_eq!(*seen.lock().unwrap(), vec![("fr".to_string(), 1)]);
    }

    #[test]
    fn test_dropping_subscription_stops_notifications() {
        let (state, _) = state_with_log("en");
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);

        let sub = state.on_change(move |_| *count_clone.lock().unwrap() += 1);
        state.set_active("cy");
        drop(sub);
        state.set_active("fr");

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_watch_active_sees_latest_value() {
        let (state, _) = state_with_log("en");
        let mut rx = state.watch_active();
        assert_eq!(*rx.borrow(), "en");

        state.set_active("cy");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "cy");
    }

    #[test]
    fn test_snapshot_with_sees_both_values() {
        let (state, _) = state_with_log("cy");
        let pair = state.snapshot_with(|active, default| format!("{}/{}", active, default));
        assert_eq!(pair, "cy/en");
    }

    #[test]
    fn test_snapshot_pairs_values() {
        let (state, _) = state_with_log("cy");
        state.set_default("fr");
        assert_eq!(state.snapshot(), ("cy".to_string(), "fr".to_string()));
    }
}
