#![forbid(unsafe_code)]

//! Reducer adapters: the single entry point dispatch calls.
//!
//! Two authoring styles are supported, converging on identical observable
//! behavior (subscribers of an unaffected field are never notified):
//!
//! - **Pure** (`Reducer::pure`): the author writes
//!   `(state, action) -> new state`. Each dispatch produces a full
//!   candidate next state that is diffed field-by-field against the
//!   current record; only differing fields are published.
//! - **Publishing** (`Reducer::publishing`): the author's closure holds a
//!   store handle and calls [`FieldStore::publish`] for exactly the fields
//!   an action changes, skipping the candidate-state allocation and diff.
//!
//! Actions are an application-defined type, intended to be a tagged union
//! matched exhaustively; an unrecognized action simply returns the state
//! unchanged, which publishes nothing.

use finegrain_core::{FieldStore, StateMap};

/// The wired reducer a [`StateBinding`](crate::binding::StateBinding)
/// dispatches through.
///
/// Invoking [`reduce`](Reducer::reduce) may publish zero, one, or several
/// independent single-field changes; there is no batching.
pub struct Reducer<V, A> {
    run: Box<dyn Fn(&StateMap<V>, &A)>,
}

impl<V, A> std::fmt::Debug for Reducer<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer").finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq + 'static, A: 'static> Reducer<V, A> {
    /// Wrap a pure whole-state reducer (style A).
    ///
    /// The candidate next state is fed into [`FieldStore::set_state`],
    /// which publishes only the fields whose values differ.
    pub fn pure<F>(store: &FieldStore<V>, f: F) -> Self
    where
        F: Fn(&StateMap<V>, &A) -> StateMap<V> + 'static,
    {
        Self {
            run: store.gen_reducer(f),
        }
    }

    /// Wrap a publisher-aware reducer (style B).
    ///
    /// The closure is expected to hold a [`FieldStore`] handle and publish
    /// the fields it changes itself.
    pub fn publishing<F>(f: F) -> Self
    where
        F: Fn(&StateMap<V>, &A) + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Run the reducer against a state snapshot.
    pub fn reduce(&self, state: &StateMap<V>, action: &A) {
        (self.run)(state, action);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
