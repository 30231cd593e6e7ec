#![forbid(unsafe_code)]

//! Shared value with change notification.
//!
//! [`Observable<T>`] keeps its value in `Rc<RefCell<..>>` storage so that
//! every clone is a handle onto the same slot. Element state such as
//! visibility lives in observables, which lets a behavior mirror one
//! element's state onto another without either element knowing.
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 on each value-changing mutation.
//! 2. `set(v)` where `v == current` is a no-op and notifies nobody.
//! 3. Subscribers run in registration order, with no borrow of the
//!    observable held, so a subscriber may read or set other observables.
//! 4. Dropped [`Subscription`] guards stop delivery immediately; their
//!    slots are pruned lazily on the next notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

type Callback<T> = Rc<dyn Fn(&T)>;

struct Slot<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<dyn Fn(&T)>>,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` yields a second handle onto the same value and
/// the same subscriber list.
pub struct Observable<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Observable")
            .field("value", &slot.value)
            .field("version", &slot.version)
            .field("subscribers", &slot.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable at version 0 with no subscribers.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.slot.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.slot.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.value == value {
                return false;
            }
            slot.value = value;
            slot.version += 1;
        }
        self.notify();
        true
    }

    /// Register `callback` to run after every value change.
    ///
    /// The callback is not invoked for the current value. Delivery stops
    /// when the returned guard is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Callback<T> = Rc::new(callback);
        self.slot
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _callback: Box::new(strong),
        }
    }

    /// Number of value-changing mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.slot.borrow().version
    }

    /// Registered subscriber slots, including dropped ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slot.borrow().subscribers.len()
    }

    /// Non-owning handle; see [`WeakObservable::upgrade`].
    #[must_use]
    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            slot: Rc::downgrade(&self.slot),
        }
    }

    /// True if both handles point at the same value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    fn notify(&self) {
        let (value, live): (T, Vec<Callback<T>>) = {
            let mut slot = self.slot.borrow_mut();
            slot.subscribers.retain(|weak| weak.strong_count() > 0);
            let live = slot.subscribers.iter().filter_map(Weak::upgrade).collect();
            (slot.value.clone(), live)
        };
        if live.is_empty() {
            return;
        }
        trace!(subscribers = live.len(), "observable changed");
        for callback in &live {
            callback(&value);
        }
    }
}

/// Weak handle to an [`Observable`]; does not keep the value alive.
pub struct WeakObservable<T> {
    slot: Weak<RefCell<Slot<T>>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Weak::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for WeakObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObservable")
            .field("alive", &(self.slot.strong_count() > 0))
            .finish()
    }
}

impl<T> WeakObservable<T> {
    /// Strong handle, if any other handle still holds the value.
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.slot.upgrade().map(|slot| Observable { slot })
    }
}

/// RAII guard for an observable subscriber.
///
/// The observable only holds a `Weak` to the callback; this guard owns the
/// strong side, so dropping it makes the callback unreachable.
pub struct Subscription {
    _callback: Box<dyn std::any::Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_bumps_version_only_on_change() {
        let visible = Observable::new(true);
        assert_eq!(visible.version(), 0);

        assert!(!visible.set(true));
        assert_eq!(visible.version(), 0);

        assert!(visible.set(false));
        assert!(!visible.get());
        assert_eq!(visible.version(), 1);
    }

    #[test]
    fn subscribers_see_new_value_in_registration_order() {
        let label = Observable::new(String::from("a"));
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        let _s1 = label.subscribe(move |v: &String| first.borrow_mut().push(format!("1:{v}")));
        let second = Rc::clone(&log);
        let _s2 = label.subscribe(move |v: &String| second.borrow_mut().push(format!("2:{v}")));

        label.set("b".into());
        assert_eq!(*log.borrow(), vec!["1:b", "2:b"]);
    }

    #[test]
    fn dropped_subscription_stops_delivery_and_is_pruned() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let sub = obs.subscribe(move |_| hits_clone.set(hits_clone.get() + 1));

        obs.set(1);
        drop(sub);
        assert_eq!(obs.subscriber_count(), 1);

        obs.set(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_set_another_observable() {
        let source = Observable::new(1);
        let target = Observable::new(0);
        let target_clone = target.clone();
        let _sub = source.subscribe(move |v| {
            target_clone.set(*v * 10);
        });

        source.set(4);
        assert_eq!(target.get(), 40);
    }

    #[test]
    fn weak_handle_does_not_keep_value_alive() {
        let obs = Observable::new(5);
        let weak = obs.downgrade();
        assert_eq!(weak.upgrade().map(|o| o.get()), Some(5));

        drop(obs);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn clones_share_value_and_identity() {
        let a = Observable::new(0);
        let b = a.clone();
        b.set(3);
        assert_eq!(a.get(), 3);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Observable::new(3)));
    }

    #[test]
    fn with_borrows_without_clone() {
        let items = Observable::new(vec![1, 2, 3]);
        assert_eq!(items.with(|v| v.len()), 3);
    }

    #[test]
    fn debug_mentions_version() {
        let obs = Observable::new(7);
        let dbg = format!("{obs:?}");
        assert!(dbg.contains("Observable"));
        assert!(dbg.contains("version"));
    }
}
