#![forbid(unsafe_code)]

//! Runtime: reducer dispatch, scope lifecycle, and per-field watchers.
//!
//! # Role in finegrain
//! `finegrain-runtime` wires an application's reducer to a
//! [`FieldStore`](finegrain_core::FieldStore) and layers consumer-facing
//! lifecycle on top: a single dispatch entry point, scope guards that
//! restore the initial state on teardown, and watchers that track one
//! field each.
//!
//! # Primary responsibilities
//! - **Reducer**: adapts either a pure whole-state function or a
//!   publisher-aware mutator into the one entry point dispatch calls.
//! - **StateBinding**: the factory tying initial state + reducer together;
//!   produces dispatchers, scopes, and watchers.
//! - **BindingScope**: owns a scope's subscriptions; resets the store to
//!   its initial snapshot when the scope ends.
//! - **DiagnosticHandle**: explicit, opt-in introspection (never a global).
//!
//! # How it fits in the system
//! Consumers hold a [`StateBinding`] (or just a [`Dispatcher`]) and zero or
//! more [`FieldWatcher`]s. Dispatching an action runs the reducer, which
//! publishes per-field changes through the store; only watchers of fields
//! that actually changed are notified.

pub mod binding;
pub mod diagnostics;
pub mod reducer;
pub mod scope;

pub use binding::{Dispatcher, FieldWatcher, StateBinding};
pub use diagnostics::DiagnosticHandle;
pub use reducer::Reducer;
pub use scope::BindingScope;

pub use finegrain_core::{FieldError, FieldStore, StateMap, Subscription};
