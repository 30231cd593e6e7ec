#![forbid(unsafe_code)]

//! Keeps a separator between consecutive logical elements of a [`Container`].
//!
//! # Model
//!
//! The container holds the *physical* sequence: elements the host added
//! (*logical* elements) plus separators the synchronizer generated. Each
//! logical element after the first is paired with the separator directly
//! in front of it. Pairings live in an [`ElementMetadataStore`]; elements
//! never learn about them.
//!
//! ```text
//!   logical:   X          Y          Z
//!   physical:  X  Sep(Y)  Y  Sep(Z)  Z
//! ```
//!
//! # Update paths
//!
//! - **Incremental**: container `Added`/`Removed` notifications are turned
//!   into reactions posted on the [`Dispatcher`]. They run when the host
//!   drains it, never inside the container mutation that reported them.
//! - **Rebuild** ([`refresh`](SeparatorSynchronizer::refresh)): clear and
//!   re-insert everything. Only attach, detach and template changes
//!   rebuild; the synchronizer is unsubscribed while it does, so its own
//!   clear/re-add traffic is never handled as caller changes.
//!
//! # Invariants (after the dispatcher is drained)
//!
//! 1. A paired separator sits in the slot directly before its element.
//! 2. Generated elements are never paired.
//! 3. Every paired separator is a member of the container.
//! 4. The first logical element has no separator.
//! 5. Detached: no separators left in the container, no pairings left.
//!
//! [`check_invariants`](SeparatorSynchronizer::check_invariants) verifies
//! 1–4 (and the pairing half of 5) against the live state, and that every
//! separator in the container still belongs to an element.
//!
//! # Failure Modes
//!
//! - **Detached**: every operation is a no-op.
//! - **Factory yields `None`**: the slot stays without separator.
//! - **Separator already gone** when its element is removed: tolerated.
//! - **Container refuses a mutation** (for example because the host drained
//!   the dispatcher from inside a container listener): logged at `warn`,
//!   the separator is skipped and no pairing is left behind.
//! - **Factory panics**: propagates to the caller of the operation (or out
//!   of `Dispatcher::drain` for incremental reactions). A rebuild asks the
//!   factory for every slot before clearing, so the container and the
//!   subscription survive the panic unchanged.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ftui_reactive::{Dispatcher, bind};
use tracing::{debug, debug_span, trace, warn};
use web_time::Instant;

use crate::config::SyncConfig;
use crate::container::{Container, ContainerChange, ContainerError, ContainerSubscription};
use crate::element::{Element, ElementId};
use crate::factory::{NoSeparator, SeparatorFactory};
use crate::metadata::ElementMetadataStore;

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Separators obtained from the factory and paired.
    pub separators_created: u64,
    /// Separators removed because their element left or lost head position.
    pub separators_removed: u64,
    /// Separators moved back in front of their element.
    pub separators_relocated: u64,
    /// Full rebuild passes that touched the container.
    pub rebuilds: u64,
    /// Reactions that found nothing to do (stale, detached, generated).
    pub reactions_skipped: u64,
}

/// A broken interleaving invariant reported by
/// [`SeparatorSynchronizer::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Paired separator is not directly in front of its element.
    SeparatorNotAdjacent {
        element: ElementId,
        separator: ElementId,
    },
    /// A generated element carries a pairing.
    GeneratedElementPaired(ElementId),
    /// Paired separator is not in the container.
    DanglingSeparator {
        element: ElementId,
        separator: ElementId,
    },
    /// The first logical element has a separator.
    LeadingSeparator(ElementId),
    /// Pairings survived a detach.
    PairingsWhileDetached(usize),
    /// A generated element in the container is not its owner's separator.
    OrphanSeparator(ElementId),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeparatorNotAdjacent { element, separator } => write!(
                f,
                "separator {} is not directly before element {}",
                separator, element
            ),
            Self::GeneratedElementPaired(id) => {
                write!(f, "generated element {} has a paired separator", id)
            }
            Self::DanglingSeparator { element, separator } => write!(
                f,
                "element {} is paired with separator {} which is not in the container",
                element, separator
            ),
            Self::LeadingSeparator(id) => {
                write!(f, "first logical element {} has a separator", id)
            }
            Self::PairingsWhileDetached(count) => {
                write!(f, "{} pairings left after detach", count)
            }
            Self::OrphanSeparator(id) => {
                write!(f, "separator {} is not paired with any element", id)
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

enum SyncState {
    Detached,
    Attached {
        container: Container,
        subscription: Option<ContainerSubscription>,
    },
}

struct Shared {
    config: SyncConfig,
    factory: Rc<dyn SeparatorFactory>,
    metadata: ElementMetadataStore,
    state: SyncState,
    stats: SyncStats,
}

/// Behavior that interleaves generated separators between the logical
/// elements of an attached [`Container`].
///
/// ```ignore
/// let dispatcher = Dispatcher::new();
/// let rows = Container::from_elements([Element::new("x")]);
/// let sync = SeparatorSynchronizer::new(&dispatcher)
///     .with_factory(LabelTemplate::new("─"));
/// sync.attach(&rows);
///
/// rows.push(Element::new("y"))?;
/// dispatcher.drain(); // rows is now [x, ─, y]
/// ```
pub struct SeparatorSynchronizer {
    core: Core,
    dispatcher: Dispatcher,
}

impl fmt::Debug for SeparatorSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.core.0.borrow();
        f.debug_struct("SeparatorSynchronizer")
            .field("attached", &matches!(shared.state, SyncState::Attached { .. }))
            .field("config", &shared.config)
            .field("metadata_entries", &shared.metadata.len())
            .field("stats", &shared.stats)
            .finish()
    }
}

impl SeparatorSynchronizer {
    /// Detached synchronizer posting its reactions to `dispatcher`.
    ///
    /// Starts with [`NoSeparator`] and [`SyncConfig::from_env`].
    #[must_use]
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            core: Core(Rc::new(RefCell::new(Shared {
                config: SyncConfig::from_env(),
                factory: Rc::new(NoSeparator),
                metadata: ElementMetadataStore::new(),
                state: SyncState::Detached,
                stats: SyncStats::default(),
            }))),
            dispatcher: dispatcher.clone(),
        }
    }

    #[must_use]
    pub fn with_factory(self, factory: impl SeparatorFactory + 'static) -> Self {
        self.core.0.borrow_mut().factory = Rc::new(factory);
        self
    }

    #[must_use]
    pub fn with_config(self, config: SyncConfig) -> Self {
        self.core.0.borrow_mut().config = config;
        self
    }

    // ── Host lifecycle ──────────────────────────────────────────────

    /// Start managing `container`: rebuild it with separators, then listen
    /// for changes. Attaching while attached detaches first.
    pub fn attach(&self, container: &Container) {
        if self.is_attached() {
            self.detach();
        }
        debug!(len = container.len(), "separator synchronizer attached");
        self.core.0.borrow_mut().state = SyncState::Attached {
            container: container.clone(),
            subscription: None,
        };
        self.quiesced(true, |core| core.rebuild(true));
    }

    /// Stop listening, strip every separator and release the container.
    pub fn detach(&self) {
        if !self.is_attached() {
            return;
        }
        self.unsubscribe();
        self.core.rebuild(false);
        let mut shared = self.core.0.borrow_mut();
        shared.metadata.clear();
        shared.state = SyncState::Detached;
        debug!(rebuilds = shared.stats.rebuilds, "separator synchronizer detached");
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.core.container().is_some()
    }

    /// The attached container, if any.
    #[must_use]
    pub fn container(&self) -> Option<Container> {
        self.core.container()
    }

    /// Swap the separator template. When attached, every separator is
    /// regenerated from the new factory.
    pub fn set_separator_factory(&self, factory: impl SeparatorFactory + 'static) {
        self.core.0.borrow_mut().factory = Rc::new(factory);
        debug!(attached = self.is_attached(), "separator factory changed");
        if self.is_attached() {
            self.quiesced(false, |core| core.rebuild(true));
        }
    }

    /// Full rebuild: with `is_active` every logical element after the first
    /// gets a fresh separator, without it all separators are stripped.
    ///
    /// No-op while detached or when the container is empty.
    pub fn refresh(&self, is_active: bool) {
        self.quiesced(false, |core| core.rebuild(is_active));
    }

    // ── Incremental reactions ───────────────────────────────────────

    /// React to `element` having been added to the container.
    ///
    /// Normally invoked from a dispatched reaction; calling it directly
    /// is safe as long as it does not happen inside a container listener.
    pub fn on_element_added(&self, element: &Element) {
        self.core.handle_added(element);
    }

    /// React to `element` having been removed from the container.
    pub fn on_element_removed(&self, element: &Element) {
        self.core.handle_removed(element);
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[must_use]
    pub fn is_generated(&self, element: &Element) -> bool {
        self.core.is_generated(element)
    }

    #[must_use]
    pub fn paired_separator(&self, element: &Element) -> Option<Element> {
        self.core.0.borrow().metadata.paired_separator(element)
    }

    /// Container contents without generated separators. Empty when detached.
    #[must_use]
    pub fn logical_elements(&self) -> Vec<Element> {
        match self.core.container() {
            Some(container) => self.core.logical_of(&container.snapshot()),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.core.0.borrow().stats
    }

    #[must_use]
    pub fn config(&self) -> SyncConfig {
        self.core.0.borrow().config
    }

    /// Verify the interleaving invariants against the current state.
    ///
    /// Meaningful once the dispatcher has been drained; queued reactions
    /// are expected to leave the state temporarily inconsistent.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let Some(container) = self.core.container() else {
            let pairings = self.core.0.borrow().metadata.pairing_count();
            return if pairings == 0 {
                Ok(())
            } else {
                Err(InvariantViolation::PairingsWhileDetached(pairings))
            };
        };
        let items = container.snapshot();
        let shared = self.core.0.borrow();
        let metadata = &shared.metadata;

        for (id, meta) in metadata.iter() {
            if meta.is_generated() && meta.paired_separator().is_some() {
                return Err(InvariantViolation::GeneratedElementPaired(id));
            }
        }

        let mut seen_logical = false;
        for (index, element) in items.iter().enumerate() {
            if metadata.is_generated(element) {
                let owned = metadata
                    .owner_of(element)
                    .is_some_and(|owner| metadata.paired_separator(&owner).as_ref() == Some(element));
                if !owned {
                    return Err(InvariantViolation::OrphanSeparator(element.id()));
                }
                continue;
            }
            let Some(separator) = metadata.paired_separator(element) else {
                seen_logical = true;
                continue;
            };
            if !seen_logical {
                return Err(InvariantViolation::LeadingSeparator(element.id()));
            }
            seen_logical = true;
            let Some(at) = items.iter().position(|item| *item == separator) else {
                return Err(InvariantViolation::DanglingSeparator {
                    element: element.id(),
                    separator: separator.id(),
                });
            };
            if at + 1 != index {
                return Err(InvariantViolation::SeparatorNotAdjacent {
                    element: element.id(),
                    separator: separator.id(),
                });
            }
        }
        Ok(())
    }

    // ── Subscription lifecycle ──────────────────────────────────────

    fn subscribe(&self) {
        let Some(container) = self.core.container() else {
            return;
        };
        let weak: Weak<RefCell<Shared>> = Rc::downgrade(&self.core.0);
        let dispatcher = self.dispatcher.clone();
        let subscription = container.subscribe(move |change| {
            let weak = weak.clone();
            let element = change.element().clone();
            let added = matches!(change, ContainerChange::Added { .. });
            trace!(element = %element.id(), added, "container change queued");
            dispatcher.post(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let core = Core(shared);
                if added {
                    core.handle_added(&element);
                } else {
                    core.handle_removed(&element);
                }
            });
        });
        if let SyncState::Attached {
            subscription: slot, ..
        } = &mut self.core.0.borrow_mut().state
        {
            *slot = Some(subscription);
        }
    }

    /// Drop the container subscription. Returns whether one was active.
    fn unsubscribe(&self) -> bool {
        let taken = match &mut self.core.0.borrow_mut().state {
            SyncState::Attached { subscription, .. } => subscription.take(),
            SyncState::Detached => None,
        };
        taken.is_some()
    }

    /// Run `f` with the container subscription suspended, then restore it
    /// (or create it, with `subscribe_after`). A panic in `f` is resumed
    /// once the subscription is back.
    fn quiesced(&self, subscribe_after: bool, f: impl FnOnce(&Core)) {
        let was_subscribed = self.unsubscribe();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&self.core)));
        if was_subscribed || subscribe_after {
            self.subscribe();
        }
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }
}

/// Shared synchronizer state. Reactions hold it only while they run.
///
/// No `RefCell` borrow is held across a factory call or a container
/// mutation.
struct Core(Rc<RefCell<Shared>>);

impl Core {
    fn container(&self) -> Option<Container> {
        match &self.0.borrow().state {
            SyncState::Attached { container, .. } => Some(container.clone()),
            SyncState::Detached => None,
        }
    }

    fn is_generated(&self, element: &Element) -> bool {
        self.0.borrow().metadata.is_generated(element)
    }

    fn is_paired(&self, element: &Element) -> bool {
        self.0.borrow().metadata.paired_separator(element).is_some()
    }

    fn logical_of(&self, items: &[Element]) -> Vec<Element> {
        let shared = self.0.borrow();
        items
            .iter()
            .filter(|item| !shared.metadata.is_generated(item))
            .cloned()
            .collect()
    }

    fn skip(&self, element: &Element, reason: &'static str) {
        self.0.borrow_mut().stats.reactions_skipped += 1;
        trace!(element = %element.id(), reason, "reaction skipped");
    }

    // ── Incremental add ─────────────────────────────────────────────

    fn handle_added(&self, element: &Element) {
        let Some(container) = self.container() else {
            return self.skip(element, "detached");
        };
        if self.is_generated(element) {
            return self.skip(element, "generated");
        }
        if !container.contains(element) {
            return self.skip(element, "no longer in container");
        }

        let paired = self.is_paired(element);
        if !paired {
            self.realign_in_front_of(&container, element);
        }
        let Some(index) = container.index_of(element) else {
            return;
        };
        let items = container.snapshot();
        let is_head = items[..index].iter().all(|item| self.is_generated(item));
        if !is_head && !paired {
            trace!(element = %element.id(), index, "element added");
            self.attach_separator(&container, element);
        }

        // The next element may be a displaced head, or its own reaction is
        // still queued behind this one.
        let next = self.logical_of(&items[index + 1..]).into_iter().next();
        if let Some(next) = next
            && !self.is_paired(&next)
        {
            trace!(element = %element.id(), displaced = %next.id(), "element displaced");
            self.realign_in_front_of(&container, &next);
            self.attach_separator(&container, &next);
        }
    }

    /// A host insertion can land between a separator and its element.
    /// Move such separators back in front of their owners.
    fn realign_in_front_of(&self, container: &Container, element: &Element) {
        let mut budget = container.len();
        while budget > 0 {
            budget -= 1;
            let Some(index) = container.index_of(element) else {
                return;
            };
            let Some(previous) = index.checked_sub(1).and_then(|i| container.get(i)) else {
                return;
            };
            if !self.is_generated(&previous) || !self.relocate(container, &previous, element) {
                return;
            }
        }
    }

    /// Move `separator` back in front of its owner, unless `anchor` owns it.
    fn relocate(&self, container: &Container, separator: &Element, anchor: &Element) -> bool {
        let owner = self.0.borrow().metadata.owner_of(separator);
        let Some(owner) = owner.filter(|owner| owner != anchor) else {
            return false;
        };
        let still_paired =
            self.0.borrow().metadata.paired_separator(&owner).as_ref() == Some(separator);
        if !still_paired || !container.contains(&owner) {
            return false;
        }
        if let Err(err) = container.remove(separator) {
            self.report_refusal(&err, separator, "relocate");
            return false;
        }
        let Some(to) = container.index_of(&owner) else {
            self.discard_pairing(&owner, separator);
            return false;
        };
        if let Err(err) = container.insert_at(to, separator.clone()) {
            self.report_refusal(&err, separator, "relocate");
            self.discard_pairing(&owner, separator);
            return false;
        }
        self.0.borrow_mut().stats.separators_relocated += 1;
        trace!(separator = %separator.id(), owner = %owner.id(), "separator realigned");
        true
    }

    /// Ask the factory for a separator and place it in front of `owner`.
    fn attach_separator(&self, container: &Container, owner: &Element) {
        let Some(separator) = self.make_separator(container, owner) else {
            return;
        };
        let Some(index) = container.index_of(owner) else {
            self.discard_pairing(owner, &separator);
            return;
        };
        if let Err(err) = container.insert_at(index, separator.clone()) {
            self.report_refusal(&err, &separator, "insert");
            self.discard_pairing(owner, &separator);
        }
    }

    /// Create, flag and pair a separator for `owner`. Does not insert it.
    fn make_separator(&self, container: &Container, owner: &Element) -> Option<Element> {
        let separator = self.fresh_separator(container, owner)?;
        self.adopt_separator(owner, separator)
    }

    /// Ask the factory for an element not yet in use. Touches no state.
    fn fresh_separator(&self, container: &Container, owner: &Element) -> Option<Element> {
        let factory = Rc::clone(&self.0.borrow().factory);
        let separator = factory.create()?;
        if separator == *owner || container.contains(&separator) || self.is_generated(&separator) {
            warn!(
                separator = %separator.id(),
                owner = %owner.id(),
                "separator factory returned an element already in use; slot left empty"
            );
            return None;
        }
        Some(separator)
    }

    /// Flag `separator` as generated and pair it with `owner`.
    fn adopt_separator(&self, owner: &Element, separator: Element) -> Option<Element> {
        let mirror = self.0.borrow().config.mirror_visibility;
        let link = mirror.then(|| bind(owner.visibility(), separator.visibility()));
        let mut shared = self.0.borrow_mut();
        shared.metadata.mark_generated(&separator, owner);
        if !shared.metadata.pair(owner, &separator, link) {
            shared.metadata.forget(&separator);
            return None;
        }
        shared.stats.separators_created += 1;
        Some(separator)
    }

    fn discard_pairing(&self, owner: &Element, separator: &Element) {
        let mut shared = self.0.borrow_mut();
        if shared.metadata.paired_separator(owner).as_ref() == Some(separator) {
            shared.metadata.unpair(owner);
        }
        shared.metadata.forget(separator);
    }

    fn report_refusal(&self, err: &ContainerError, separator: &Element, op: &'static str) {
        warn!(
            separator = %separator.id(),
            op,
            error = %err,
            "container refused separator mutation; separator skipped"
        );
    }

    // ── Incremental remove ──────────────────────────────────────────

    fn handle_removed(&self, element: &Element) {
        let Some(container) = self.container() else {
            return self.skip(element, "detached");
        };
        if self.is_generated(element) {
            self.settle_removed_separator(&container, element);
            return;
        }

        let separator = self.0.borrow_mut().metadata.unpair(element);
        if let Some(separator) = separator {
            trace!(element = %element.id(), separator = %separator.id(), "paired element removed");
            self.remove_separator(&container, &separator);
        }
        self.strip_head_separator(&container);
    }

    /// Bookkeeping once a generated separator has left the container.
    fn settle_removed_separator(&self, container: &Container, separator: &Element) {
        if container.contains(separator) {
            // Moved, not removed.
            return self.skip(separator, "separator still present");
        }
        let mut shared = self.0.borrow_mut();
        if let Some(owner) = shared.metadata.owner_of(separator)
            && shared.metadata.paired_separator(&owner).as_ref() == Some(separator)
        {
            shared.metadata.unpair(&owner);
        }
        shared.metadata.forget(separator);
    }

    fn remove_separator(&self, container: &Container, separator: &Element) {
        match container.remove(separator) {
            Ok(true) => self.0.borrow_mut().stats.separators_removed += 1,
            Ok(false) => trace!(separator = %separator.id(), "separator already gone"),
            Err(err) => self.report_refusal(&err, separator, "remove"),
        }
    }

    /// Whoever is first now must not carry a separator.
    fn strip_head_separator(&self, container: &Container) {
        let head = self.logical_of(&container.snapshot()).into_iter().next();
        let Some(head) = head else {
            return;
        };
        let separator = self.0.borrow_mut().metadata.unpair(&head);
        if let Some(separator) = separator {
            trace!(element = %head.id(), "first element lost its separator");
            self.remove_separator(container, &separator);
        }
    }

    // ── Rebuild ─────────────────────────────────────────────────────

    fn rebuild(&self, is_active: bool) {
        let Some(container) = self.container() else {
            return;
        };
        if container.is_empty() {
            return;
        }

        let start = Instant::now();
        let span = debug_span!(
            "separators.rebuild",
            is_active,
            logical = tracing::field::Empty,
            separators = tracing::field::Empty,
            duration_us = tracing::field::Empty
        )
        .entered();

        let items = container.snapshot();
        let (logical, discarded): (Vec<Element>, Vec<Element>) =
            items.into_iter().partition(|item| !self.is_generated(item));

        // Every factory call happens before the container is touched, so a
        // panicking factory leaves it as it was.
        let mut fresh: Vec<Option<Element>> = Vec::with_capacity(logical.len());
        for (i, element) in logical.iter().enumerate() {
            let separator = if is_active && i != 0 {
                self.fresh_separator(&container, element)
                    .filter(|candidate| !fresh.iter().flatten().any(|taken| taken == candidate))
            } else {
                None
            };
            fresh.push(separator);
        }

        if let Err(err) = container.clear() {
            warn!(error = %err, "container refused rebuild; separators left as they were");
            return;
        }
        {
            let mut shared = self.0.borrow_mut();
            for element in &logical {
                shared.metadata.unpair(element);
            }
            for separator in &discarded {
                shared.metadata.forget(separator);
            }
            shared.stats.rebuilds += 1;
        }

        let mut separators = 0u64;
        for (element, separator) in logical.iter().zip(fresh) {
            if let Some(separator) = separator
                && let Some(separator) = self.adopt_separator(element, separator)
            {
                match container.push(separator.clone()) {
                    Ok(()) => separators += 1,
                    Err(err) => {
                        self.report_refusal(&err, &separator, "rebuild");
                        self.discard_pairing(element, &separator);
                    }
                }
            }
            if let Err(err) = container.push(element.clone()) {
                warn!(element = %element.id(), error = %err, "element dropped during rebuild");
            }
        }

        let duration_us = start.elapsed().as_micros() as u64;
        span.record("logical", logical.len() as u64);
        span.record("separators", separators);
        span.record("duration_us", duration_us);
        debug!(
            is_active,
            logical = logical.len() as u64,
            separators,
            discarded = discarded.len() as u64,
            duration_us,
            "separators rebuilt"
        );
    }
}
