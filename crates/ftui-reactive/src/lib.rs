#![forbid(unsafe_code)]

//! Reactive primitives for single-threaded UI state.
//!
//! # Role in FrankenTUI
//! `ftui-reactive` holds the small set of building blocks that element
//! collections and behaviors use to react to change without owning each
//! other:
//!
//! - [`Observable`] - shared, version-tracked value with change notification
//! - [`Binding`] - live one-way link copying one observable into another
//! - [`Dispatcher`] - FIFO queue for work that must run after the current
//!   mutation call has returned
//!
//! Everything here is `!Send`: the types assume one scheduling context
//! (a UI main loop) and use `Rc`/`RefCell` internally.

pub mod binding;
pub mod dispatcher;
pub mod observable;

pub use binding::{Binding, bind};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use observable::{Observable, Subscription, WeakObservable};
