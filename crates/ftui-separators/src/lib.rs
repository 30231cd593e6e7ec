#![forbid(unsafe_code)]

//! Separator interleaving for observable element containers.
//!
//! # Role in FrankenTUI
//! `ftui-separators` is a behavior: it attaches to a host-owned
//! [`Container`] and keeps a generated separator element between every
//! pair of consecutive elements the host added, as the host inserts and
//! removes elements or swaps the separator template. It never owns the
//! container and leaves it clean when detached.
//!
//! # Primary responsibilities
//! - **Element / Container**: identity-compared nodes in an ordered,
//!   observable sequence.
//! - **SeparatorFactory**: where separators come from.
//! - **ElementMetadataStore**: which elements are separators and which
//!   separator belongs to which element.
//! - **SeparatorSynchronizer**: the incremental and rebuild algorithms.
//!
//! # How it fits in the system
//! Reactions to container changes are deferred through an
//! [`ftui_reactive::Dispatcher`] that the host drains from its main loop,
//! so the container is never mutated from inside its own notification.

pub mod config;
pub mod container;
pub mod element;
pub mod factory;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod metadata;
pub mod synchronizer;

pub use config::SyncConfig;
pub use container::{Container, ContainerChange, ContainerError, ContainerSubscription};
pub use element::{Element, ElementId};
pub use factory::{LabelTemplate, NoSeparator, SeparatorFactory};
pub use ftui_reactive::{Dispatcher, DispatcherConfig};
pub use metadata::{ElementFlags, ElementMetadata, ElementMetadataStore};
pub use synchronizer::{InvariantViolation, SeparatorSynchronizer, SyncStats};
