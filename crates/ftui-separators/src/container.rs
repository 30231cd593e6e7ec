#![forbid(unsafe_code)]

//! Ordered, observable element container.
//!
//! [`Container`] is the host-owned sequence that behaviors attach to. Every
//! mutation reports what changed to subscribed listeners, synchronously,
//! before the mutation call returns.
//!
//! # Invariants
//!
//! 1. One `Added` per inserted element and one `Removed` per removed
//!    element, carrying the index the element had at that moment.
//! 2. `clear` reports `Removed` for each former element, front to back.
//! 3. Listeners run with no borrow of the container held, so they may
//!    query it.
//!
//! # Failure Modes
//!
//! - **Re-entrant mutation**: mutating the container from inside a listener
//!   returns [`ContainerError::ReentrantMutation`] and leaves the sequence
//!   untouched. Listeners that need to react with a mutation must defer it
//!   (see `ftui_reactive::Dispatcher`).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::element::{Element, ElementId};

/// A change reported to container listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerChange {
    Added { element: Element, index: usize },
    Removed { element: Element, index: usize },
}

impl ContainerChange {
    #[must_use]
    pub fn element(&self) -> &Element {
        match self {
            Self::Added { element, .. } | Self::Removed { element, .. } => element,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Added { index, .. } | Self::Removed { index, .. } => *index,
        }
    }
}

/// Errors returned by container mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Insert or remove position past the end.
    IndexOutOfBounds { index: usize, len: usize },
    /// Mutation attempted while listeners were being notified.
    ReentrantMutation,
    /// The element is already a member of this container.
    AlreadyPresent(ElementId),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {} out of bounds (length {})", index, len)
            }
            Self::ReentrantMutation => {
                write!(f, "container mutated from inside its own change notification")
            }
            Self::AlreadyPresent(id) => write!(f, "element {} is already in the container", id),
        }
    }
}

impl std::error::Error for ContainerError {}

type Listener = Rc<dyn Fn(&ContainerChange)>;

struct Members {
    items: Vec<Element>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    notify_depth: u32,
}

/// Shared handle to an ordered element sequence.
///
/// Cloning yields another handle onto the same sequence.
#[derive(Clone)]
pub struct Container {
    members: Rc<RefCell<Members>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self.members.borrow();
        f.debug_struct("Container")
            .field("items", &members.items)
            .field("listeners", &members.listeners.len())
            .finish()
    }
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Rc::new(RefCell::new(Members {
                items: Vec::new(),
                listeners: Vec::new(),
                next_listener: 0,
                notify_depth: 0,
            })),
        }
    }

    /// Container pre-filled with `items`. No listeners exist yet, so
    /// nothing is reported.
    #[must_use]
    pub fn from_elements(items: impl IntoIterator<Item = Element>) -> Self {
        let container = Self::new();
        container.members.borrow_mut().items.extend(items);
        container
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().items.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Element> {
        self.members.borrow().items.get(index).cloned()
    }

    #[must_use]
    pub fn index_of(&self, element: &Element) -> Option<usize> {
        self.members
            .borrow()
            .items
            .iter()
            .position(|item| item == element)
    }

    #[must_use]
    pub fn contains(&self, element: &Element) -> bool {
        self.index_of(element).is_some()
    }

    /// Copy of the current sequence, front to back.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Element> {
        self.members.borrow().items.clone()
    }

    /// True while listeners are being notified.
    #[must_use]
    pub fn is_notifying(&self) -> bool {
        self.members.borrow().notify_depth > 0
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.members.borrow().listeners.len()
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Insert `element` at `index`, shifting later elements back.
    pub fn insert_at(&self, index: usize, element: Element) -> Result<(), ContainerError> {
        {
            let mut members = self.writable()?;
            let len = members.items.len();
            if index > len {
                return Err(ContainerError::IndexOutOfBounds { index, len });
            }
            if members.items.contains(&element) {
                return Err(ContainerError::AlreadyPresent(element.id()));
            }
            members.items.insert(index, element.clone());
        }
        self.notify(&ContainerChange::Added { element, index });
        Ok(())
    }

    /// Append `element`.
    pub fn push(&self, element: Element) -> Result<(), ContainerError> {
        let len = self.len();
        self.insert_at(len, element)
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Element, ContainerError> {
        let element = {
            let mut members = self.writable()?;
            let len = members.items.len();
            if index >= len {
                return Err(ContainerError::IndexOutOfBounds { index, len });
            }
            members.items.remove(index)
        };
        self.notify(&ContainerChange::Removed {
            element: element.clone(),
            index,
        });
        Ok(element)
    }

    /// Remove `element` if present. Returns whether it was a member.
    pub fn remove(&self, element: &Element) -> Result<bool, ContainerError> {
        if self.is_notifying() {
            return Err(ContainerError::ReentrantMutation);
        }
        match self.index_of(element) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Remove every element, reporting each removal front to back.
    pub fn clear(&self) -> Result<(), ContainerError> {
        let removed = std::mem::take(&mut self.writable()?.items);
        trace!(removed = removed.len(), "container cleared");
        for (index, element) in removed.into_iter().enumerate() {
            self.notify(&ContainerChange::Removed { element, index });
        }
        Ok(())
    }

    // ── Listeners ───────────────────────────────────────────────────

    /// Register `listener` for every subsequent change.
    ///
    /// The listener stays registered until the returned guard is dropped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ContainerChange) + 'static,
    ) -> ContainerSubscription {
        let mut members = self.members.borrow_mut();
        let id = members.next_listener;
        members.next_listener += 1;
        members.listeners.push((id, Rc::new(listener)));
        ContainerSubscription {
            members: Rc::downgrade(&self.members),
            id,
        }
    }

    fn writable(&self) -> Result<std::cell::RefMut<'_, Members>, ContainerError> {
        let members = self.members.borrow_mut();
        if members.notify_depth > 0 {
            return Err(ContainerError::ReentrantMutation);
        }
        Ok(members)
    }

    fn notify(&self, change: &ContainerChange) {
        let listeners: Vec<Listener> = {
            let mut members = self.members.borrow_mut();
            members.notify_depth += 1;
            members
                .listeners
                .iter()
                .map(|(_, listener)| Rc::clone(listener))
                .collect()
        };
        let _depth = NotifyDepth {
            members: &self.members,
        };
        for listener in &listeners {
            listener(change);
        }
    }
}

/// Decrements the notification depth even if a listener panics.
struct NotifyDepth<'a> {
    members: &'a RefCell<Members>,
}

impl Drop for NotifyDepth<'_> {
    fn drop(&mut self) {
        let mut members = self.members.borrow_mut();
        members.notify_depth = members.notify_depth.saturating_sub(1);
    }
}

/// RAII guard for a container listener. Dropping it unsubscribes.
pub struct ContainerSubscription {
    members: Weak<RefCell<Members>>,
    id: u64,
}

impl ContainerSubscription {
    /// Whether the container this subscription belongs to still exists.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.members.strong_count() > 0
    }
}

impl fmt::Debug for ContainerSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerSubscription")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Drop for ContainerSubscription {
    fn drop(&mut self) {
        if let Some(members) = self.members.upgrade() {
            members
                .borrow_mut()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recording(container: &Container) -> (Rc<RefCell<Vec<ContainerChange>>>, ContainerSubscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let sub = container.subscribe(move |change| log_clone.borrow_mut().push(change.clone()));
        (log, sub)
    }

    #[test]
    fn insert_and_remove_report_changes_with_indices() {
        let container = Container::new();
        let (log, _sub) = recording(&container);
        let a = Element::new("a");
        let b = Element::new("b");

        container.push(a.clone()).unwrap();
        container.insert_at(0, b.clone()).unwrap();
        assert_eq!(container.snapshot(), vec![b.clone(), a.clone()]);

        assert_eq!(container.remove_at(1).unwrap(), a);
        assert_eq!(
            *log.borrow(),
            vec![
                ContainerChange::Added { element: a.clone(), index: 0 },
                ContainerChange::Added { element: b.clone(), index: 0 },
                ContainerChange::Removed { element: a, index: 1 },
            ]
        );
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let container = Container::new();
        assert_eq!(
            container.insert_at(1, Element::new("x")),
            Err(ContainerError::IndexOutOfBounds { index: 1, len: 0 })
        );
        assert_eq!(
            container.remove_at(0),
            Err(ContainerError::IndexOutOfBounds { index: 0, len: 0 })
        );
    }

    #[test]
    fn duplicate_membership_is_rejected() {
        let container = Container::new();
        let a = Element::new("a");
        container.push(a.clone()).unwrap();
        assert_eq!(container.push(a.clone()), Err(ContainerError::AlreadyPresent(a.id())));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn remove_absent_element_is_ok_false() {
        let container = Container::from_elements([Element::new("a")]);
        assert_eq!(container.remove(&Element::new("b")), Ok(false));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn clear_reports_each_removal_in_order() {
        let a = Element::new("a");
        let b = Element::new("b");
        let container = Container::from_elements([a.clone(), b.clone()]);
        let (log, _sub) = recording(&container);

        container.clear().unwrap();
        assert!(container.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![
                ContainerChange::Removed { element: a, index: 0 },
                ContainerChange::Removed { element: b, index: 1 },
            ]
        );
    }

    #[test]
    fn mutation_from_listener_is_rejected() {
        let container = Container::new();
        let inner = container.clone();
        let outcome = Rc::new(RefCell::new(None));
        let outcome_clone = Rc::clone(&outcome);
        let _sub = container.subscribe(move |change| {
            if let ContainerChange::Added { .. } = change {
                let result = inner.insert_at(0, Element::new("echo"));
                *outcome_clone.borrow_mut() = Some(result);
            }
        });

        container.push(Element::new("a")).unwrap();
        assert_eq!(
            *outcome.borrow(),
            Some(Err(ContainerError::ReentrantMutation))
        );
        assert_eq!(container.len(), 1);
        assert!(!container.is_notifying());
    }

    #[test]
    fn listener_can_query_during_notification() {
        let container = Container::new();
        let inner = container.clone();
        let seen_len = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen_len);
        let _sub = container.subscribe(move |_| seen_clone.set(inner.len()));

        container.push(Element::new("a")).unwrap();
        assert_eq!(seen_len.get(), 1, "notification happens after the insert");
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let container = Container::new();
        let (log, sub) = recording(&container);
        assert_eq!(container.listener_count(), 1);
        drop(sub);
        assert_eq!(container.listener_count(), 0);

        container.push(Element::new("a")).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn subscription_outliving_container_is_harmless() {
        let container = Container::new();
        let (_log, sub) = recording(&container);
        drop(container);
        assert!(!sub.is_live());
        drop(sub);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ContainerError::IndexOutOfBounds { index: 4, len: 2 }.to_string(),
            "index 4 out of bounds (length 2)"
        );
        assert!(ContainerError::ReentrantMutation.to_string().contains("notification"));
    }
}
