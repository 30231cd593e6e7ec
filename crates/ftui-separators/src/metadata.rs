#![forbid(unsafe_code)]

//! Identity-keyed side table of per-element separator bookkeeping.
//!
//! Elements know nothing about separators. The [`ElementMetadataStore`]
//! records, keyed by [`ElementId`], which elements are generated
//! separators and which separator each logical element is paired with.
//! An entry exists only while it carries information; clearing the last
//! flag drops the entry.
//!
//! A pairing also owns the visibility [`Binding`] that keeps the separator
//! mirroring its element, so breaking the pairing tears the link down.

use std::fmt;

use ahash::AHashMap;
use bitflags::bitflags;
use ftui_reactive::Binding;

use crate::element::{Element, ElementId};

bitflags! {
    /// Per-element state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ElementFlags: u8 {
        /// Created by the synchronizer as a separator.
        const GENERATED = 0b0000_0001;
        /// Has a separator immediately before it.
        const PAIRED    = 0b0000_0010;
    }
}

/// Bookkeeping for one element.
#[derive(Default)]
pub struct ElementMetadata {
    flags: ElementFlags,
    paired_separator: Option<Element>,
    /// For generated elements: the logical element the separator precedes.
    owner: Option<Element>,
    visibility_link: Option<Binding>,
}

impl ElementMetadata {
    #[must_use]
    pub fn flags(&self) -> ElementFlags {
        self.flags
    }

    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.flags.contains(ElementFlags::GENERATED)
    }

    #[must_use]
    pub fn paired_separator(&self) -> Option<&Element> {
        self.paired_separator.as_ref()
    }

    #[must_use]
    pub fn owner(&self) -> Option<&Element> {
        self.owner.as_ref()
    }

    #[must_use]
    pub fn has_visibility_link(&self) -> bool {
        self.visibility_link.is_some()
    }

    fn is_vacant(&self) -> bool {
        self.flags.is_empty()
    }
}

impl fmt::Debug for ElementMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementMetadata")
            .field("flags", &self.flags)
            .field("paired_separator", &self.paired_separator.as_ref().map(Element::id))
            .field("owner", &self.owner.as_ref().map(Element::id))
            .field("visibility_link", &self.visibility_link.is_some())
            .finish()
    }
}

/// Side table from element identity to [`ElementMetadata`].
#[derive(Debug, Default)]
pub struct ElementMetadataStore {
    entries: AHashMap<ElementId, ElementMetadata>,
}

impl ElementMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, element: &Element) -> Option<&ElementMetadata> {
        self.entries.get(&element.id())
    }

    #[must_use]
    pub fn is_generated(&self, element: &Element) -> bool {
        self.get(element).is_some_and(ElementMetadata::is_generated)
    }

    #[must_use]
    pub fn paired_separator(&self, element: &Element) -> Option<Element> {
        self.get(element)
            .and_then(|meta| meta.paired_separator.clone())
    }

    /// The logical element a generated separator was created for.
    #[must_use]
    pub fn owner_of(&self, separator: &Element) -> Option<Element> {
        self.get(separator).and_then(|meta| meta.owner.clone())
    }

    /// Flag `separator` as generated on behalf of `owner`.
    pub fn mark_generated(&mut self, separator: &Element, owner: &Element) {
        let meta = self.entries.entry(separator.id()).or_default();
        meta.flags.insert(ElementFlags::GENERATED);
        meta.owner = Some(owner.clone());
    }

    /// Pair `separator` with `element`, replacing any previous pairing.
    ///
    /// Refused (returns `false`) when `element` is itself generated or
    /// `separator` is not: separators are never paired to separators.
    pub fn pair(&mut self, element: &Element, separator: &Element, link: Option<Binding>) -> bool {
        if self.is_generated(element) || !self.is_generated(separator) {
            return false;
        }
        let meta = self.entries.entry(element.id()).or_default();
        meta.flags.insert(ElementFlags::PAIRED);
        meta.paired_separator = Some(separator.clone());
        meta.visibility_link = link;
        true
    }

    /// Break `element`'s pairing and return the separator it had.
    ///
    /// The visibility link is dropped with the pairing. The separator's own
    /// entry is left in place.
    pub fn unpair(&mut self, element: &Element) -> Option<Element> {
        let id = element.id();
        let meta = self.entries.get_mut(&id)?;
        let separator = meta.paired_separator.take();
        meta.visibility_link = None;
        meta.flags.remove(ElementFlags::PAIRED);
        if meta.is_vacant() {
            self.entries.remove(&id);
        }
        separator
    }

    /// Drop every record about `element`.
    pub fn forget(&mut self, element: &Element) -> Option<ElementMetadata> {
        self.entries.remove(&element.id())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of elements currently paired with a separator.
    #[must_use]
    pub fn pairing_count(&self) -> usize {
        self.entries
            .values()
            .filter(|meta| meta.flags.contains(ElementFlags::PAIRED))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &ElementMetadata)> {
        self.entries.iter().map(|(id, meta)| (*id, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftui_reactive::bind;

    fn generated(store: &mut ElementMetadataStore, owner: &Element) -> Element {
        let separator = Element::new("sep");
        store.mark_generated(&separator, owner);
        separator
    }

    #[test]
    fn pair_and_unpair() {
        let mut store = ElementMetadataStore::new();
        let row = Element::new("row");
        let sep = generated(&mut store, &row);

        assert!(store.pair(&row, &sep, None));
        assert_eq!(store.paired_separator(&row), Some(sep.clone()));
        assert_eq!(store.owner_of(&sep), Some(row.clone()));
        assert_eq!(store.pairing_count(), 1);

        assert_eq!(store.unpair(&row), Some(sep.clone()));
        assert_eq!(store.paired_separator(&row), None);
        assert!(store.get(&row).is_none(), "vacant entry is dropped");
        assert!(store.is_generated(&sep), "separator entry survives unpair");
    }

    #[test]
    fn separators_are_never_paired() {
        let mut store = ElementMetadataStore::new();
        let row = Element::new("row");
        let sep = generated(&mut store, &row);
        let other = generated(&mut store, &row);

        assert!(!store.pair(&sep, &other, None));
        assert!(!store.pair(&row, &Element::new("not generated"), None));
        assert_eq!(store.pairing_count(), 0);
    }

    #[test]
    fn unpair_drops_visibility_link() {
        let mut store = ElementMetadataStore::new();
        let row = Element::new("row");
        let sep = generated(&mut store, &row);
        let link = bind(row.visibility(), sep.visibility());
        store.pair(&row, &sep, Some(link));
        assert!(store.get(&row).is_some_and(ElementMetadata::has_visibility_link));

        row.set_visible(false);
        assert!(!sep.is_visible());

        store.unpair(&row);
        row.set_visible(true);
        assert!(!sep.is_visible(), "link must be gone after unpair");
    }

    #[test]
    fn unpair_unknown_element_is_none() {
        let mut store = ElementMetadataStore::new();
        assert_eq!(store.unpair(&Element::new("x")), None);
    }

    #[test]
    fn forget_and_clear() {
        let mut store = ElementMetadataStore::new();
        let row = Element::new("row");
        let sep = generated(&mut store, &row);
        store.pair(&row, &sep, None);
        assert_eq!(store.len(), 2);

        assert!(store.forget(&sep).is_some_and(|m| m.is_generated()));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn flags_reflect_state() {
        let mut store = ElementMetadataStore::new();
        let row = Element::new("row");
        let sep = generated(&mut store, &row);
        store.pair(&row, &sep, None);

        let flags: Vec<_> = store.iter().map(|(_, meta)| meta.flags()).collect();
        assert!(flags.contains(&ElementFlags::GENERATED));
        assert!(flags.contains(&ElementFlags::PAIRED));
    }
}
