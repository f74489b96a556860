#![forbid(unsafe_code)]

//! Minimal element tree that bindings write into.
//!
//! An [`ElementRef`] is a shared handle to a node carrying string attributes
//! (where binding expressions and ids live), arbitrary [`Value`] fields
//! (what bindings write), and parent/child links. A [`Document`] owns a root
//! element; an element is *live* while it is attached somewhere below that
//! root, which is what [`Document::element_by_id`] checks.
//!
//! Parents hold their children strongly and children hold their parent
//! weakly, so dropping the last outside handle to a detached subtree frees it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::value::Value;

/// Attribute holding an element's id.
pub const ID_ATTRIBUTE: &str = "id";

struct ElementNode {
    tag: String,
    attributes: RefCell<AHashMap<String, String>>,
    fields: RefCell<AHashMap<String, Value>>,
    parent: RefCell<Weak<ElementNode>>,
    children: RefCell<Vec<ElementRef>>,
}

/// Shared handle to an element node.
#[derive(Clone)]
pub struct ElementRef(Rc<ElementNode>);

/// Non-owning handle to an element node.
#[derive(Clone, Default)]
pub struct WeakElement(Weak<ElementNode>);

impl WeakElement {
    /// The element, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ElementRef> {
        self.0.upgrade().map(ElementRef)
    }
}

impl fmt::Debug for WeakElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakElement")
            .field(&self.0.strong_count())
            .finish()
    }
}

impl ElementRef {
    /// Create a detached element.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Rc::new(ElementNode {
            tag: tag.into(),
            attributes: RefCell::new(AHashMap::new()),
            fields: RefCell::new(AHashMap::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// Builder: set an attribute.
    #[must_use]
    pub fn with_attribute(self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder: set a field.
    #[must_use]
    pub fn with_field(self, name: &str, value: impl Into<Value>) -> Self {
        self.set_field(name, value.into());
        self
    }

    /// Builder: append a child.
    #[must_use]
    pub fn with_child(self, child: ElementRef) -> Self {
        self.append_child(&child);
        self
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.borrow().contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.to_owned(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow_mut().remove(name)
    }

    /// The element's `id` attribute, if set and non-empty.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.attribute(ID_ATTRIBUTE).filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.0.fields.borrow_mut().insert(name.to_owned(), value);
    }

    #[must_use]
    pub fn parent(&self) -> Option<ElementRef> {
        self.0.parent.borrow().upgrade().map(ElementRef)
    }

    /// Snapshot of the element's children.
    #[must_use]
    pub fn children(&self) -> Vec<ElementRef> {
        self.0.children.borrow().clone()
    }

    /// Attach `child` as the last child, detaching it from any previous parent.
    pub fn append_child(&self, child: &ElementRef) {
        child.detach();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    /// Detach `child`. Returns `false` if it was not a child of this element.
    pub fn remove_child(&self, child: &ElementRef) -> bool {
        let mut children = self.0.children.borrow_mut();
        let before = children.len();
        children.retain(|c| !c.ptr_eq(child));
        if children.len() == before {
            return false;
        }
        *child.0.parent.borrow_mut() = Weak::new();
        true
    }

    /// Detach from the current parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// All descendants in document (pre-)order, excluding `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<ElementRef> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementRef> = self.children().into_iter().rev().collect();
        while let Some(element) = stack.pop() {
            stack.extend(element.children().into_iter().rev());
            out.push(element);
        }
        out
    }

    /// Whether `ancestor` is `self` or one of its ancestors.
    #[must_use]
    pub fn is_within(&self, ancestor: &ElementRef) -> bool {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if element.ptr_eq(ancestor) {
                return true;
            }
            current = element.parent();
        }
        false
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// `tag#id` (or just `tag`) for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.id() {
            Some(id) => format!("{}#{id}", self.0.tag),
            None => self.0.tag.clone(),
        }
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("tag", &self.0.tag)
            .field("id", &self.id())
            .field("children", &self.0.children.borrow().len())
            .finish()
    }
}

/// A tree of elements under a single root.
#[derive(Clone, Debug)]
pub struct Document {
    root: ElementRef,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with an empty `body` root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ElementRef::new("body"),
        }
    }

    #[must_use]
    pub fn root(&self) -> &ElementRef {
        &self.root
    }

    /// Find a live element by id. Detached elements are never found.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<ElementRef> {
        if self.root.id().as_deref() == Some(id) {
            return Some(self.root.clone());
        }
        self.root
            .descendants()
            .into_iter()
            .find(|element| element.id().as_deref() == Some(id))
    }

    /// Whether `element` is attached below this document's root.
    #[must_use]
    pub fn contains(&self, element: &ElementRef) -> bool {
        element.is_within(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Document, ElementRef, ElementRef) {
        let doc = Document::new();
        let a = ElementRef::new("div").with_attribute("id", "a");
        let b = ElementRef::new("span").with_attribute("id", "b");
        a.append_child(&b);
        doc.root().append_child(&a);
        (doc, a, b)
    }

    #[test]
    fn lookup_finds_attached_elements_only() {
        let (doc, a, b) = tree();
        assert!(doc.element_by_id("b").is_some_and(|e| e.ptr_eq(&b)));
        a.remove_child(&b);
        assert!(doc.element_by_id("b").is_none());
        assert!(doc.element_by_id("a").is_some());
        assert!(!doc.contains(&b));
    }

    #[test]
    fn descendants_are_in_document_order() {
        let root = ElementRef::new("root")
            .with_child(
                ElementRef::new("a")
                    .with_child(ElementRef::new("a1"))
                    .with_child(ElementRef::new("a2")),
            )
            .with_child(ElementRef::new("b"));
        let tags: Vec<String> = root
            .descendants()
            .iter()
            .map(|e| e.tag().to_owned())
            .collect();
        assert_eq!(tags, ["a", "a1", "a2", "b"]);
    }

    #[test]
    fn append_reparents() {
        let (doc, a, b) = tree();
        doc.root().append_child(&b);
        assert!(a.children().is_empty());
        assert!(b.parent().is_some_and(|p| p.ptr_eq(doc.root())));
    }

    #[test]
    fn weak_handle_dies_with_last_strong_ref() {
        let element = ElementRef::new("p");
        let weak = element.downgrade();
        assert!(weak.upgrade().is_some());
        drop(element);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn empty_id_is_treated_as_missing() {
        let element = ElementRef::new("p").with_attribute("id", "");
        assert_eq!(element.id(), None);
        assert_eq!(element.describe(), "p");
    }
}
