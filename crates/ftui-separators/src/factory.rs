#![forbid(unsafe_code)]

//! Separator templates.
//!
//! A [`SeparatorFactory`] hands out a fresh element each time a slot needs
//! a separator. Returning `None` means "no separator for this slot" and is
//! not an error. A factory that panics is a configuration defect; the
//! panic reaches whoever triggered the separator request.

use std::fmt;

use crate::element::Element;

/// Produces separator elements on demand.
pub trait SeparatorFactory {
    /// A new separator, or `None` to leave the slot empty.
    ///
    /// Each call must return a distinct element (or `None`).
    fn create(&self) -> Option<Element>;
}

impl<F> SeparatorFactory for F
where
    F: Fn() -> Option<Element>,
{
    fn create(&self) -> Option<Element> {
        self()
    }
}

/// Factory that never yields a separator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoSeparator;

impl SeparatorFactory for NoSeparator {
    fn create(&self) -> Option<Element> {
        None
    }
}

/// Factory producing a new element with a fixed label on every call.
#[derive(Clone, PartialEq, Eq)]
pub struct LabelTemplate {
    label: String,
    start_hidden: bool,
}

impl LabelTemplate {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start_hidden: false,
        }
    }

    /// Produced separators start hidden until a visibility link updates them.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.start_hidden = true;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for LabelTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelTemplate")
            .field("label", &self.label)
            .field("start_hidden", &self.start_hidden)
            .finish()
    }
}

impl SeparatorFactory for LabelTemplate {
    fn create(&self) -> Option<Element> {
        Some(if self.start_hidden {
            Element::hidden(self.label.clone())
        } else {
            Element::new(self.label.clone())
        })
    }
}
