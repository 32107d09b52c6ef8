#![forbid(unsafe_code)]

//! The binding factory: initial state + reducer in, dispatch + scopes +
//! watchers out.
//!
//! # Design
//!
//! [`StateBinding`] is constructed once per independent state domain. It
//! snapshots the initial state (for scope-teardown restoration), builds
//! the [`FieldStore`], wires the reducer, and then hands out the three
//! consumer-facing primitives:
//!
//! - [`dispatch`](StateBinding::dispatch) / [`Dispatcher`]: submit actions.
//! - [`scope`](StateBinding::scope): a guard that restores the initial
//!   snapshot when the consuming scope ends.
//! - [`watch`](StateBinding::watch) / [`FieldWatcher`]: track one field,
//!   with an optional change callback carrying the re-render obligation.
//!
//! # Invariants
//!
//! 1. The initial snapshot is captured once, never mutated, and outlives
//!    every scope created from the binding.
//! 2. A watcher's cached value always equals the store's current value for
//!    its field (updated synchronously during publish).
//! 3. Dropping a watcher unsubscribes it; re-watching a field any number
//!    of times accumulates no side effects from prior watchers.
//!
//! # Failure Modes
//!
//! - Watching a field outside the key set fails fast with
//!   [`FieldError::UnknownField`].
//! - A watcher's change callback panicking propagates to the publisher
//!   (the dispatch call site); the store's state is already updated.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use finegrain_core::{FieldError, FieldStore, StateMap, Subscription};

use crate::diagnostics::DiagnosticHandle;
use crate::reducer::Reducer;
use crate::scope::BindingScope;

/// Factory output tying one state domain together: store, initial
/// snapshot, and wired reducer.
pub struct StateBinding<V, A> {
    store: FieldStore<V>,
    initial: StateMap<V>,
    reducer: Rc<Reducer<V, A>>,
}

impl<V: std::fmt::Debug, A> std::fmt::Debug for StateBinding<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBinding")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq + 'static, A: 'static> StateBinding<V, A> {
    /// Create a binding from a pure whole-state reducer (style A).
    ///
    /// Every dispatch produces a candidate next state that is diffed
    /// field-by-field against the current record; only changed fields are
    /// published.
    pub fn new<K, I, F>(initial: I, reducer: F) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        F: Fn(&StateMap<V>, &A) -> StateMap<V> + 'static,
    {
        let initial: StateMap<V> = initial.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let store = FieldStore::new(initial.clone());
        let reducer = Rc::new(Reducer::pure(&store, reducer));
        Self {
            store,
            initial,
            reducer,
        }
    }

    /// Create a binding from a publisher-aware reducer (style B).
    ///
    /// `maker` receives a handle to the freshly built store and returns
    /// the reducer closure; the closure publishes exactly the fields each
    /// action changes.
    pub fn with_publisher<K, I, M, F>(initial: I, maker: M) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        M: FnOnce(FieldStore<V>) -> F,
        F: Fn(&StateMap<V>, &A) + 'static,
    {
        let initial: StateMap<V> = initial.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let store = FieldStore::new(initial.clone());
        let reducer = Rc::new(Reducer::publishing(maker(store.clone())));
        Self {
            store,
            initial,
            reducer,
        }
    }

    /// Submit an action. The reducer runs synchronously against a snapshot
    /// of the live state; every resulting field change is published before
    /// this returns.
    pub fn dispatch(&self, action: A) {
        let before = self.store.version();
        let state = self.store.state();
        self.reducer.reduce(&state, &action);
        debug!(changes = self.store.version() - before, "action dispatched");
    }

    /// A cheap, cloneable handle carrying only the dispatch capability,
    /// for consumers that must not see the store.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<A> {
        let store = self.store.clone();
        let reducer = Rc::clone(&self.reducer);
        Dispatcher {
            run: Rc::new(move |action: A| {
                let before = store.version();
                let state = store.state();
                reducer.reduce(&state, &action);
                trace!(
                    changes = store.version() - before,
                    "action dispatched via handle"
                );
            }),
        }
    }

    /// Open a consuming scope. Dropping the returned guard releases the
    /// subscriptions it holds and restores every field to its
    /// construction-time value, notifying surviving subscribers of each
    /// field that had drifted.
    #[must_use]
    pub fn scope(&self) -> BindingScope<V> {
        BindingScope::new(self.store.clone(), self.initial.clone())
    }

    /// Track one field's current value. The watcher's cache updates
    /// synchronously on each publish; dropping the watcher unsubscribes.
    ///
    /// # Errors
    ///
    /// [`FieldError::UnknownField`] if `field` is not in the key set.
    pub fn watch(&self, field: &str) -> Result<FieldWatcher<V>, FieldError> {
        FieldWatcher::new(&self.store, field, None)
    }

    /// Like [`watch`](StateBinding::watch), with a change callback.
    ///
    /// `on_change` is the re-render obligation: it runs synchronously,
    /// after the watcher's cache is updated, once per published change of
    /// this field.
    pub fn watch_with(
        &self,
        field: &str,
        on_change: impl Fn(&V) + 'static,
    ) -> Result<FieldWatcher<V>, FieldError> {
        FieldWatcher::new(&self.store, field, Some(Rc::new(on_change)))
    }

    /// Opt-in introspection handle. Callers capture and store it
    /// themselves; nothing is installed globally.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticHandle<V, A> {
        DiagnosticHandle::new(self.store.clone(), self.dispatcher())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatch-only handle produced by
/// [`StateBinding::dispatcher`]. Clones share the same binding.
pub struct Dispatcher<A> {
    run: Rc<dyn Fn(A)>,
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            run: Rc::clone(&self.run),
        }
    }
}

impl<A> std::fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl<A> Dispatcher<A> {
    /// Submit an action through the owning binding's reducer.
    pub fn dispatch(&self, action: A) {
        (self.run)(action);
    }
}

// ---------------------------------------------------------------------------
// FieldWatcher
// ---------------------------------------------------------------------------

/// A live view of one field: cached current value plus the subscription
/// keeping it fresh.
///
/// State machine: Unsubscribed → Subscribed(value) on construction →
/// Subscribed(value') on each publish with a differing value →
/// Unsubscribed on drop. A field may be re-watched indefinitely.
pub struct FieldWatcher<V> {
    field: String,
    current: Rc<RefCell<V>>,
    _subscription: Subscription,
}

impl<V: std::fmt::Debug> std::fmt::Debug for FieldWatcher<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldWatcher")
            .field("field", &self.field)
            .field("current", &self.current.borrow())
            .finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq + 'static> FieldWatcher<V> {
    fn new(
        store: &FieldStore<V>,
        field: &str,
        on_change: Option<Rc<dyn Fn(&V)>>,
    ) -> Result<Self, FieldError> {
        let seed = store.get(field).ok_or_else(|| FieldError::UnknownField {
            field: field.to_string(),
        })?;
        let current = Rc::new(RefCell::new(seed));
        let cache = Rc::clone(&current);
        let subscription = store.subscribe(field, move |_, value| {
            *cache.borrow_mut() = value.clone();
            if let Some(notify) = &on_change {
                notify(value);
            }
        })?;
        trace!(field, "field watcher attached");
        Ok(Self {
            field: field.to_string(),
            current,
            _subscription: subscription,
        })
    }

    /// The watched field's name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Clone of the cached current value.
    #[must_use]
    pub fn get(&self) -> V {
        self.current.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
