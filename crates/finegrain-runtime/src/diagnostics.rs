#![forbid(unsafe_code)]

//! Opt-in introspection for a state domain.
//!
//! A [`DiagnosticHandle`] bundles read access to the store with a
//! dispatcher, for debug consoles and tests. It is returned only from
//! [`StateBinding::diagnostics`](crate::binding::StateBinding::diagnostics);
//! callers who want it capture and store the reference themselves. Nothing
//! is ever installed on a process-wide namespace, and no other component
//! may rely on a handle existing.

use finegrain_core::{FieldStore, StateMap};

use crate::binding::Dispatcher;

/// Read-plus-dispatch handle for manual inspection of one state domain.
pub struct DiagnosticHandle<V, A> {
    store: FieldStore<V>,
    dispatcher: Dispatcher<A>,
}

impl<V: std::fmt::Debug, A> std::fmt::Debug for DiagnosticHandle<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticHandle")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq + 'static, A: 'static> DiagnosticHandle<V, A> {
    pub(crate) fn new(store: FieldStore<V>, dispatcher: Dispatcher<A>) -> Self {
        Self { store, dispatcher }
    }

    /// Clone of the full state record.
    #[must_use]
    pub fn state(&self) -> StateMap<V> {
        self.store.state()
    }

    /// Clone of one field's current value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<V> {
        self.store.get(field)
    }

    /// The store's field names, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.store.fields()
    }

    /// Published-change count since construction.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Registered subscriptions across all fields (dead entries included
    /// until the next publish prunes them).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Submit an action through the owning binding's reducer.
    pub fn dispatch(&self, action: A) {
        self.dispatcher.dispatch(action);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
