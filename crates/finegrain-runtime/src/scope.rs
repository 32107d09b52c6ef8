#![forbid(unsafe_code)]

//! Scope lifecycle: subscription ownership plus reset-on-teardown.
//!
//! A [`BindingScope`] models one consuming unit (a page section, a widget,
//! a test) that owns zero or more subscriptions. When the scope ends —
//! the guard is dropped — its subscriptions are released first, then every
//! field is restored to its construction-time value through the store's
//! normal diffing bulk update. Fields that never drifted publish nothing;
//! each drifted field produces exactly one restoring notification,
//! delivered to subscribers that survive the scope (watchers owned by
//! other scopes, diagnostics, and so on).
//!
//! Mount/unmount may repeat indefinitely: a fresh scope from the same
//! binding starts from the same immutable snapshot.
//!
//! # Invariants
//!
//! 1. Scope-owned subscriptions never observe the teardown reset.
//! 2. Resetting an undrifted store is a no-op (zero notifications).
//! 3. `clear()` releases subscriptions without resetting (reusable scope).

use tracing::debug;

use finegrain_core::{FieldError, FieldStore, StateMap, Subscription};

/// Guard owning one scope's subscriptions; restores the initial snapshot
/// on drop.
pub struct BindingScope<V: Clone + PartialEq + 'static> {
    store: FieldStore<V>,
    initial: StateMap<V>,
    subscriptions: Vec<Subscription>,
}

impl<V: Clone + PartialEq + 'static> BindingScope<V> {
    pub(crate) fn new(store: FieldStore<V>, initial: StateMap<V>) -> Self {
        Self {
            store,
            initial,
            subscriptions: Vec::new(),
        }
    }

    /// Subscribe to one field for the duration of this scope.
    ///
    /// # Errors
    ///
    /// [`FieldError::UnknownField`] if `field` is not in the key set.
    pub fn subscribe(
        &mut self,
        field: &str,
        callback: impl Fn(&StateMap<V>, &V) + 'static,
    ) -> Result<&mut Self, FieldError> {
        let sub = self.store.subscribe(field, callback)?;
        self.subscriptions.push(sub);
        Ok(self)
    }

    /// Hand an externally created subscription to this scope; it is
    /// released when the scope ends.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Number of subscriptions this scope currently owns.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the scope owns no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release all owned subscriptions immediately without resetting the
    /// store. The scope stays usable.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl<V: Clone + PartialEq + 'static> Drop for BindingScope<V> {
    fn drop(&mut self) {
        // Own subscriptions go first so they never see the restore pass.
        self.subscriptions.clear();
        debug!(fields = self.initial.len(), "scope ended, restoring initial state");
        self.store.set_state(&self.initial);
    }
}

impl<V: Clone + PartialEq + 'static> std::fmt::Debug for BindingScope<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
