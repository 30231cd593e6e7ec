#![forbid(unsafe_code)]

//! One-way value links between observables.
//!
//! [`bind`] copies `source` into `target` immediately and then on every
//! change of `source`, for as long as the returned [`Binding`] is alive.
//! The link holds the target weakly: a binding never keeps the target's
//! owner alive, and a binding whose target is gone does nothing.
//!
//! ```ignore
//! let row_visible = Observable::new(true);
//! let rule_visible = Observable::new(true);
//! let link = bind(&row_visible, &rule_visible);
//! row_visible.set(false);
//! assert!(!rule_visible.get());
//! drop(link); // rule_visible no longer follows row_visible
//! ```

use std::fmt;

use crate::observable::{Observable, Subscription};

/// Guard for a live one-way link created by [`bind`].
///
/// Dropping the guard tears the link down.
#[must_use = "dropping a Binding immediately unlinks the observables"]
pub struct Binding {
    _subscription: Subscription,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}

/// Mirror `source` onto `target` until the returned guard is dropped.
pub fn bind<T>(source: &Observable<T>, target: &Observable<T>) -> Binding
where
    T: Clone + PartialEq + 'static,
{
    target.set(source.get());
    let weak_target = target.downgrade();
    let subscription = source.subscribe(move |value: &T| {
        if let Some(target) = weak_target.upgrade() {
            target.set(value.clone());
        }
    });
    Binding {
        _subscription: subscription,
    }
}
