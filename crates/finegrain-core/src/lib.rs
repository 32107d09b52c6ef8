#![forbid(unsafe_code)]

//! Core: the keyed publisher, subscription guards, and error types.
//!
//! # Role in finegrain
//! `finegrain-core` is the state layer. It owns the canonical state record
//! (a fixed set of named fields) and the per-field subscriber table, and it
//! is the only place a field value is ever written.
//!
//! # Primary responsibilities
//! - **FieldStore**: the state record plus change-gated, per-field publish.
//! - **Subscription**: RAII guard tying a callback's lifetime to its owner.
//! - **FieldError**: the one fallible path (addressing an unknown field).
//!
//! # How it fits in the system
//! The runtime (`finegrain-runtime`) wires application reducers to a
//! `FieldStore` and layers scope lifecycle on top. Consumers never write
//! state directly; they dispatch actions upstream and subscribe to single
//! fields here.

pub mod error;
pub mod store;

pub use error::FieldError;
pub use store::{FieldStore, StateMap, Subscription};
