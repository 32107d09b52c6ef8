#![forbid(unsafe_code)]

//! Keyed state store with per-field change notification.
//!
//! # Design
//!
//! [`FieldStore<V>`] wraps a state record (field name → value) in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). The key set is fixed at
//! construction. When a field's value changes (determined by `PartialEq`),
//! the canonical record is updated first, then every live subscriber
//! registered for that field is notified in registration order.
//!
//! Subscribers for *other* fields are never invoked: subscription is the
//! unit of granularity, and publication is gated per field.
//!
//! # Performance
//!
//! | Operation     | Complexity                              |
//! |---------------|-----------------------------------------|
//! | `get()`       | O(log F) where F = fields               |
//! | `publish()`   | O(S + F) where S = total subscribers    |
//! | `set_state()` | O(F · (S + F))                          |
//! | `subscribe()` | O(log F) amortized                      |
//!
//! # Failure Modes
//!
//! - **Unknown field on subscribe**: fails fast with
//!   [`FieldError::UnknownField`]. The key set cannot grow, so such a
//!   subscription could never fire.
//! - **Unknown field on publish**: logged no-op returning `false`. Keys are
//!   never created outside construction.
//! - **Subscriber leak**: dead weak references (dropped [`Subscription`]
//!   guards) are pruned lazily during the next publish.
//! - **Re-entrant publish**: allowed. No interior borrow is held while
//!   callbacks run, so a callback may publish, subscribe, or drop guards.
//!   The in-progress pass keeps delivering the snapshot it started with.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::error::FieldError;

/// The canonical state record: field name to current value.
///
/// `BTreeMap` keeps bulk-update iteration deterministic.
pub type StateMap<V> = BTreeMap<String, V>;

/// A subscriber callback stored as a strong `Rc` inside the guard, handed
/// to the store as `Weak`.
type CallbackRc<V> = Rc<dyn Fn(&StateMap<V>, &V)>;
type CallbackWeak<V> = Weak<dyn Fn(&StateMap<V>, &V)>;

/// One registered subscription: a field key plus the callback it feeds.
struct SubscriberEntry<V> {
    field: String,
    callback: CallbackWeak<V>,
}

/// Shared interior for [`FieldStore<V>`].
struct StoreInner<V> {
    state: StateMap<V>,
    /// Bumped exactly once per published field change.
    version: u64,
    /// All subscriptions, in registration order. Entries for one field are
    /// notified in the order they appear here.
    subscribers: Vec<SubscriberEntry<V>>,
}

/// A keyed state record with per-field, change-gated publication.
///
/// Cloning a `FieldStore` creates a new handle to the **same** inner state;
/// both handles see the same record and share subscribers. Exactly one
/// store exists per independent state domain.
///
/// # Invariants
///
/// 1. The key set is fixed at construction; `publish` and `set_state`
///    never create or remove keys.
/// 2. `publish(k, v)` where `v == state[k]` is a no-op: no version bump,
///    no notifications.
/// 3. The canonical record is updated *before* subscribers run, so every
///    callback observes the record with the new value already in place.
/// 4. Subscribers of one field are notified in registration order; other
///    fields' subscribers are never invoked.
/// 5. `version` increments by exactly 1 per published change.
pub struct FieldStore<V> {
    inner: Rc<RefCell<StoreInner<V>>>,
}

// Manual Clone: shares the same Rc.
impl<V> Clone for FieldStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for FieldStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FieldStore")
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<V: Clone + PartialEq + 'static> FieldStore<V> {
    /// Create a store from an initial set of `(field, value)` pairs.
    ///
    /// The resulting key set is fixed for the lifetime of the store.
    /// Duplicate keys keep the last value. The initial version is 0 and no
    /// subscribers are registered.
    #[must_use]
    pub fn new<K, I>(initial: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let state: StateMap<V> = initial.into_iter().map(|(k, v)| (k.into(), v)).collect();
        debug!(fields = state.len(), "field store constructed");
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                state,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Get a clone of one field's current value, or `None` for a field
    /// outside the key set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<V> {
        self.inner.borrow().state.get(field).cloned()
    }

    /// Access the full state record by reference without cloning.
    pub fn with_state<R>(&self, f: impl FnOnce(&StateMap<V>) -> R) -> R {
        f(&self.inner.borrow().state)
    }

    /// Get a clone of the full state record.
    #[must_use]
    pub fn state(&self) -> StateMap<V> {
        self.inner.borrow().state.clone()
    }

    /// Whether `field` belongs to the store's key set.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.inner.borrow().state.contains_key(field)
    }

    /// The field names in the key set, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.inner.borrow().state.keys().cloned().collect()
    }

    /// Current version. Increments by exactly 1 per published change.
    /// Useful for dirty-checking and diagnostics.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscriptions across all fields (including
    /// dead ones not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Number of registered subscriptions for one field (including dead
    /// ones not yet pruned).
    #[must_use]
    pub fn field_subscriber_count(&self, field: &str) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|e| e.field == field)
            .count()
    }

    /// Subscribe to one field's changes.
    ///
    /// The callback is invoked with a snapshot of the full state record
    /// (taken after the canonical write, at the start of the notification
    /// pass) and the new value, each time the field's value changes.
    /// Registration order is notification order. The same closure may be
    /// registered multiple times and fires once per registration.
    ///
    /// Returns a [`Subscription`] guard; dropping it unsubscribes.
    ///
    /// # Errors
    ///
    /// [`FieldError::UnknownField`] if `field` is not in the key set.
    pub fn subscribe(
        &self,
        field: &str,
        callback: impl Fn(&StateMap<V>, &V) + 'static,
    ) -> Result<Subscription, FieldError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.state.contains_key(field) {
            return Err(FieldError::UnknownField {
                field: field.to_string(),
            });
        }
        let strong: CallbackRc<V> = Rc::new(callback);
        let weak = Rc::downgrade(&strong);
        inner.subscribers.push(SubscriberEntry {
            field: field.to_string(),
            callback: weak,
        });
        trace!(field, total = inner.subscribers.len(), "subscriber registered");
        // The guard is the only strong reference; the entry above dies
        // with it. Type-erased because `Rc<dyn Fn(..)>` cannot coerce to
        // `Rc<dyn Any>` directly.
        Ok(Subscription {
            _guard: Box::new(strong),
        })
    }

    /// Publish a new value for one field.
    ///
    /// Change-gated: if `value` equals the current value (`PartialEq`),
    /// nothing happens and `false` is returned. Otherwise the canonical
    /// record is updated first, the version bumped, and every live
    /// subscriber for `field` is invoked synchronously in registration
    /// order. Returns `true` when a change was published.
    ///
    /// Publishing to a field outside the key set is a logged no-op; keys
    /// are never created here.
    pub fn publish(&self, field: &str, value: V) -> bool {
        let (snapshot, pass) = {
            let mut inner = self.inner.borrow_mut();
            match inner.state.get(field) {
                None => {
                    warn!(field, "publish to unknown field ignored");
                    return false;
                }
                Some(current) if *current == value => {
                    trace!(field, "publish gated: value unchanged");
                    return false;
                }
                Some(_) => {}
            }
            inner.state.insert(field.to_string(), value.clone());
            inner.version += 1;
            // Prune dead entries, then snapshot this field's pass in
            // registration order.
            inner.subscribers.retain(|e| e.callback.strong_count() > 0);
            let pass: Vec<CallbackWeak<V>> = inner
                .subscribers
                .iter()
                .filter(|e| e.field == field)
                .map(|e| e.callback.clone())
                .collect();
            debug!(
                field,
                version = inner.version,
                subscribers = pass.len(),
                "field change published"
            );
            (inner.state.clone(), pass)
        };
        // Borrow released: callbacks may re-enter the store freely.
        for weak in &pass {
            // Re-check liveness so a guard dropped earlier in this pass
            // is skipped rather than invoked posthumously.
            if let Some(cb) = weak.upgrade() {
                cb(&snapshot, &value);
            }
        }
        true
    }

    /// Bulk update: publish every field of `next` whose value differs from
    /// the current record.
    ///
    /// Keys absent from the key set are skipped, never created. Each
    /// differing field produces one independent publish; there is no
    /// batching or cross-field atomicity. This is the sole bulk entry
    /// point, and the one scope teardown uses to restore the initial
    /// snapshot.
    pub fn set_state(&self, next: &StateMap<V>) {
        for (field, value) in next {
            if !self.contains_field(field) {
                trace!(field = field.as_str(), "set_state skipped unknown field");
                continue;
            }
            self.publish(field, value.clone());
        }
    }

    /// Adapt a whole-state reducer onto this store.
    ///
    /// Wraps a pure `(state, action) -> new state` function so that each
    /// invocation feeds its candidate next state into [`set_state`],
    /// publishing only the fields that actually changed. The returned
    /// closure is the entry point a dispatch loop calls.
    ///
    /// [`set_state`]: FieldStore::set_state
    pub fn gen_reducer<A, F>(&self, f: F) -> Box<dyn Fn(&StateMap<V>, &A)>
    where
        F: Fn(&StateMap<V>, &A) -> StateMap<V> + 'static,
        A: 'static,
    {
        let store = self.clone();
        Box::new(move |state, action| {
            let next = f(state, action);
            store.set_state(&next);
        })
    }
}

/// RAII guard for one subscription.
///
/// The store holds only a weak reference to the callback; this guard holds
/// the strong one. Dropping the guard unsubscribes: the callback will not
/// run again, even in a notification pass already in progress. Dropping is
/// idempotent and safe from within a callback.
#[must_use = "dropping a Subscription immediately unsubscribes it"]
pub struct Subscription {
    /// Type-erased strong reference keeping the callback `Rc` alive.
    _guard: Box<dyn std::any::Any>,
}

impl Subscription {
    /// Explicitly end the subscription. Equivalent to dropping the guard.
    pub fn cancel(self) {}
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn trigger_store() -> FieldStore<String> {
        FieldStore::new([
            ("theme", "dark".to_string()),
            ("volume", "mute".to_string()),
        ])
    }

    #[test]
    fn construct_and_get() {
        let store = trigger_store();
        assert_eq!(store.get("theme").as_deref(), Some("dark"));
        assert_eq!(store.get("volume").as_deref(), Some("mute"));
        assert_eq!(store.get("speed"), None);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn fields_are_sorted() {
        let store = trigger_store();
        assert_eq!(store.fields(), vec!["theme".to_string(), "volume".to_string()]);
    }

    #[test]
    fn publish_updates_state_and_version() {
        let store = trigger_store();
        assert!(store.publish("theme", "light".to_string()));
        assert_eq!(store.get("theme").as_deref(), Some("light"));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn publish_equal_value_is_gated() {
        let store = trigger_store();
        assert!(!store.publish("theme", "dark".to_string()));
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn publish_unknown_field_is_noop() {
        let store = trigger_store();
        assert!(!store.publish("speed", "2".to_string()));
        assert_eq!(store.get("speed"), None);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn subscriber_sees_updated_snapshot_and_new_value() {
        let store = trigger_store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _sub = store
            .subscribe("theme", move |state, value| {
                log.borrow_mut()
                    .push((state["theme"].clone(), value.clone()));
            })
            .unwrap();

        store.publish("theme", "light".to_string());
        // The canonical write happens before notification, so the snapshot
        // already carries the new value.
        assert_eq!(
            *seen.borrow(),
            vec![("light".to_string(), "light".to_string())]
        );
    }

    #[test]
    fn field_isolation() {
        let store = trigger_store();
        let theme_calls = Rc::new(Cell::new(0u32));
        let calls = Rc::clone(&theme_calls);
        let _sub = store
            .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
            .unwrap();

        store.publish("volume", "normal".to_string());
        assert_eq!(theme_calls.get(), 0);

        store.publish("theme", "light".to_string());
        assert_eq!(theme_calls.get(), 1);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let store = trigger_store();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _s1 = store.subscribe("theme", move |_, _| l1.borrow_mut().push('A')).unwrap();
        let l2 = Rc::clone(&log);
        let _s2 = store.subscribe("theme", move |_, _| l2.borrow_mut().push('B')).unwrap();
        let l3 = Rc::clone(&log);
        let _s3 = store.subscribe("theme", move |_, _| l3.borrow_mut().push('C')).unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn duplicate_registration_fires_per_entry() {
        let store = trigger_store();
        let count = Rc::new(Cell::new(0u32));
        let shared = Rc::clone(&count);
        let callback = move |_: &StateMap<String>, _: &String| shared.set(shared.get() + 1);

        let _s1 = store.subscribe("theme", callback.clone()).unwrap();
        let _s2 = store.subscribe("theme", callback).unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn subscribe_unknown_field_fails_fast() {
        let store = trigger_store();
        let err = store.subscribe("speed", |_, _| {}).unwrap_err();
        assert_eq!(
            err,
            FieldError::UnknownField {
                field: "speed".to_string()
            }
        );
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let store = trigger_store();
        let count = Rc::new(Cell::new(0u32));
        let calls = Rc::clone(&count);
        let sub = store
            .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
            .unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(count.get(), 1);

        drop(sub);
        store.publish("theme", "dark".to_string());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cancel_is_equivalent_to_drop() {
        let store = trigger_store();
        let count = Rc::new(Cell::new(0u32));
        let calls = Rc::clone(&count);
        let sub = store
            .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
            .unwrap();
        sub.cancel();

        store.publish("theme", "light".to_string());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn drop_during_pass_takes_effect_immediately() {
        let store = trigger_store();
        let later = Rc::new(RefCell::new(None::<Subscription>));
        let fired = Rc::new(Cell::new(false));

        // First subscriber drops the guard of a subscriber registered
        // after it; the second must then be skipped in the same pass.
        let victim_slot = Rc::clone(&later);
        let _dropper = store
            .subscribe("theme", move |_, _| {
                victim_slot.borrow_mut().take();
            })
            .unwrap();

        let flag = Rc::clone(&fired);
        let victim = store
            .subscribe("theme", move |_, _| flag.set(true))
            .unwrap();
        *later.borrow_mut() = Some(victim);

        store.publish("theme", "light".to_string());
        assert!(!fired.get(), "dropped subscriber must not fire in the same pass");
    }

    #[test]
    fn drop_during_pass_leaves_others_intact() {
        let store = trigger_store();
        let later = Rc::new(RefCell::new(None::<Subscription>));
        let tail_calls = Rc::new(Cell::new(0u32));

        let victim_slot = Rc::clone(&later);
        let _dropper = store
            .subscribe("theme", move |_, _| {
                victim_slot.borrow_mut().take();
            })
            .unwrap();
        *later.borrow_mut() = Some(store.subscribe("theme", |_, _| {}).unwrap());
        let tail = Rc::clone(&tail_calls);
        let _survivor = store
            .subscribe("theme", move |_, _| tail.set(tail.get() + 1))
            .unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(tail_calls.get(), 1, "later subscribers still fire exactly once");
    }

    #[test]
    fn dead_subscribers_pruned_on_publish() {
        let store = trigger_store();
        let s1 = store.subscribe("theme", |_, _| {}).unwrap();
        let _s2 = store.subscribe("theme", |_, _| {}).unwrap();
        assert_eq!(store.subscriber_count(), 2);

        drop(s1);
        // Dead entry lingers until the next publish prunes it.
        assert_eq!(store.subscriber_count(), 2);

        store.publish("theme", "light".to_string());
        assert_eq!(store.subscriber_count(), 1);
        assert_eq!(store.field_subscriber_count("theme"), 1);
    }

    #[test]
    fn set_state_publishes_only_diffs() {
        let store = trigger_store();
        let theme_calls = Rc::new(Cell::new(0u32));
        let volume_calls = Rc::new(Cell::new(0u32));
        let tc = Rc::clone(&theme_calls);
        let vc = Rc::clone(&volume_calls);
        let _st = store.subscribe("theme", move |_, _| tc.set(tc.get() + 1)).unwrap();
        let _sv = store
            .subscribe("volume", move |_, _| vc.set(vc.get() + 1))
            .unwrap();

        let next: StateMap<String> = [
            ("theme".to_string(), "dark".to_string()),
            ("volume".to_string(), "normal".to_string()),
        ]
        .into_iter()
        .collect();
        store.set_state(&next);

        assert_eq!(theme_calls.get(), 0, "unchanged field stays silent");
        assert_eq!(volume_calls.get(), 1);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn set_state_ignores_unknown_keys() {
        let store = trigger_store();
        let next: StateMap<String> = [("speed".to_string(), "2".to_string())]
            .into_iter()
            .collect();
        store.set_state(&next);
        assert_eq!(store.get("speed"), None);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn set_state_identical_is_silent() {
        let store = trigger_store();
        let count = Rc::new(Cell::new(0u32));
        let calls = Rc::clone(&count);
        let _sub = store
            .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
            .unwrap();

        store.set_state(&store.state());
        assert_eq!(count.get(), 0);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn reentrant_publish_from_callback() {
        let store = trigger_store();
        let volume_seen = Rc::new(RefCell::new(Vec::new()));

        // Theme subscriber flips volume; both passes complete synchronously.
        let inner_store = store.clone();
        let _theme = store
            .subscribe("theme", move |_, _| {
                inner_store.publish("volume", "normal".to_string());
            })
            .unwrap();
        let log = Rc::clone(&volume_seen);
        let _volume = store
            .subscribe("volume", move |_, value| log.borrow_mut().push(value.clone()))
            .unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(*volume_seen.borrow(), vec!["normal".to_string()]);
        assert_eq!(store.get("volume").as_deref(), Some("normal"));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn reentrant_subscribe_does_not_join_current_pass() {
        let store = trigger_store();
        let late_calls = Rc::new(Cell::new(0u32));

        let reg_store = store.clone();
        let slot = Rc::new(RefCell::new(Vec::<Subscription>::new()));
        let keep = Rc::clone(&slot);
        let late = Rc::clone(&late_calls);
        let _s1 = store
            .subscribe("theme", move |_, _| {
                let calls = Rc::clone(&late);
                let sub = reg_store
                    .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
                    .unwrap();
                keep.borrow_mut().push(sub);
            })
            .unwrap();

        store.publish("theme", "light".to_string());
        assert_eq!(late_calls.get(), 0, "pass snapshot excludes new registrations");

        store.publish("theme", "dark".to_string());
        assert!(late_calls.get() >= 1, "new registration fires on the next pass");
    }

    #[test]
    fn clone_shares_state_and_subscribers() {
        let store = trigger_store();
        let count = Rc::new(Cell::new(0u32));
        let calls = Rc::clone(&count);
        let _sub = store
            .subscribe("theme", move |_, _| calls.set(calls.get() + 1))
            .unwrap();

        let handle = store.clone();
        handle.publish("theme", "light".to_string());
        assert_eq!(count.get(), 1);
        assert_eq!(store.get("theme").as_deref(), Some("light"));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn version_monotonic_over_many_publishes() {
        let store = trigger_store();
        for i in 0..50 {
            store.publish("theme", format!("theme-{i}"));
        }
        assert_eq!(store.version(), 50);
        assert_eq!(store.get("theme").as_deref(), Some("theme-49"));
    }

    #[test]
    fn with_state_reads_without_cloning() {
        let store = trigger_store();
        let n = store.with_state(|state| state.len());
        assert_eq!(n, 2);
    }

    #[test]
    fn gen_reducer_feeds_set_state() {
        let store = trigger_store();
        let volume_calls = Rc::new(Cell::new(0u32));
        let vc = Rc::clone(&volume_calls);
        let _sub = store
            .subscribe("volume", move |_, _| vc.set(vc.get() + 1))
            .unwrap();

        enum Action {
            ToggleMute,
            Noop,
        }
        let reduce = store.gen_reducer(|state: &StateMap<String>, action: &Action| {
            let mut next = state.clone();
            match action {
                Action::ToggleMute => {
                    let flipped = if state["volume"] == "mute" { "normal" } else { "mute" };
                    next.insert("volume".to_string(), flipped.to_string());
                }
                Action::Noop => {}
            }
            next
        });

        reduce(&store.state(), &Action::ToggleMute);
        assert_eq!(store.get("volume").as_deref(), Some("normal"));
        assert_eq!(volume_calls.get(), 1);

        reduce(&store.state(), &Action::Noop);
        assert_eq!(volume_calls.get(), 1, "unrecognized work publishes nothing");
    }

    #[test]
    fn debug_format() {
        let store = trigger_store();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("FieldStore"));
        assert!(dbg.contains("dark"));
        assert!(dbg.contains("version"));
    }
}
