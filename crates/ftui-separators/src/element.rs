#![forbid(unsafe_code)]

//! Identity-comparable UI elements.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ftui_reactive::Observable;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique element identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ElementNode {
    id: ElementId,
    label: String,
    visible: Observable<bool>,
}

/// Handle to a UI node.
///
/// Cloning shares the node. Equality and hashing are by identity: two
/// elements with the same label are still different elements.
#[derive(Clone)]
pub struct Element {
    node: Rc<ElementNode>,
}

impl Element {
    /// New visible element.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            node: Rc::new(ElementNode {
                id: ElementId::next(),
                label: label.into(),
                visible: Observable::new(true),
            }),
        }
    }

    /// New element that starts hidden.
    #[must_use]
    pub fn hidden(label: impl Into<String>) -> Self {
        let element = Self::new(label);
        element.set_visible(false);
        element
    }

    #[must_use]
    pub fn id(&self) -> ElementId {
        self.node.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.node.label
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.node.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        self.node.visible.set(visible);
    }

    /// The observable behind [`is_visible`](Self::is_visible), for binding.
    #[must_use]
    pub fn visibility(&self) -> &Observable<bool> {
        &self.node.visible
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.id.hash(state);
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.node.id)
            .field("label", &self.node.label)
            .field("visible", &self.is_visible())
            .finish()
    }
}
