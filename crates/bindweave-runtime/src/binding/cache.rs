#![forbid(unsafe_code)]

//! Parse and binding bookkeeping shared across orchestration passes.
//!
//! The expression table maps raw expression text to its declarations, so a
//! repeated expression is parsed once. Initializers are resolved on that
//! first parse; later passes reuse them even if given another context.
//!
//! The element table maps each processed element's weak reference id to the
//! bindings established for it; processing an element again cancels those
//! first.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use super::handle::BindingHandle;
use super::parser::{BindingDeclaration, ParseError, parse};
use crate::error::BindingError;
use crate::value::Value;

/// Bindings established for one element.
#[derive(Debug, Default)]
pub struct ElementBindings {
    pub bindings: Vec<BindingHandle>,
    /// Some binding on the element produced no handle and cannot be
    /// canceled in bulk.
    pub nocache: bool,
}

#[derive(Default)]
struct CacheInner {
    expressions: RefCell<AHashMap<String, Rc<[BindingDeclaration]>>>,
    elements: RefCell<AHashMap<String, ElementBindings>>,
}

/// Shared expression and per-element binding cache.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct BindingCache {
    inner: Rc<CacheInner>,
}

impl fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCache")
            .field("expressions", &self.inner.expressions.borrow().len())
            .field("elements", &self.inner.elements.borrow().len())
            .finish()
    }
}

impl BindingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations for `text`, parsing on first use.
    ///
    /// Declarations whose destination is exactly `id` are dropped here, with
    /// one warning per distinct expression.
    pub fn declarations(
        &self,
        text: &str,
        context: &Value,
    ) -> Result<Rc<[BindingDeclaration]>, ParseError> {
        if let Some(cached) = self.inner.expressions.borrow().get(text) {
            return Ok(Rc::clone(cached));
        }
        let parsed: Rc<[BindingDeclaration]> = parse(text, context)?
            .into_iter()
            .filter(|decl| {
                if decl.destination.is_id() {
                    let err = BindingError::UnsupportedDestination {
                        expression: text.to_owned(),
                    };
                    tracing::warn!(
                        target: "bindweave::declarative",
                        error = %err,
                        "binding to 'id' is not supported; declaration dropped"
                    );
                    false
                } else {
                    true
                }
            })
            .collect();
        self.inner
            .expressions
            .borrow_mut()
            .insert(text.to_owned(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Cancel and forget every binding recorded for element `id`.
    ///
    /// Returns whether the element had an entry.
    pub fn cancel_element(&self, id: &str) -> bool {
        let entry = self.inner.elements.borrow_mut().remove(id);
        let Some(entry) = entry else {
            return false;
        };
        if entry.nocache {
            tracing::debug!(
                target: "bindweave::declarative",
                id,
                "element has untracked bindings; only tracked ones are canceled"
            );
        }
        for handle in entry.bindings {
            handle.cancel();
        }
        true
    }

    /// Record a binding for element `id`. `None` marks the element nocache.
    pub fn record(&self, id: &str, handle: Option<BindingHandle>) {
        let mut elements = self.inner.elements.borrow_mut();
        let entry = elements.entry(id.to_owned()).or_default();
        match handle {
            Some(handle) => entry.bindings.push(handle),
            None => entry.nocache = true,
        }
    }

    /// Make sure element `id` has an entry, even with no bindings.
    pub fn touch(&self, id: &str) {
        self.inner
            .elements
            .borrow_mut()
            .entry(id.to_owned())
            .or_default();
    }

    #[must_use]
    pub fn binding_count(&self, id: &str) -> usize {
        self.inner
            .elements
            .borrow()
            .get(id)
            .map_or(0, |entry| entry.bindings.len())
    }

    #[must_use]
    pub fn is_nocache(&self, id: &str) -> bool {
        self.inner
            .elements
            .borrow()
            .get(id)
            .is_some_and(|entry| entry.nocache)
    }

    #[must_use]
    pub fn has_element(&self, id: &str) -> bool {
        self.inner.elements.borrow().contains_key(id)
    }

    #[must_use]
    pub fn expression_count(&self) -> usize {
        self.inner.expressions.borrow().len()
    }

    /// Cancel every recorded binding and drop every cached parse.
    pub fn clear(&self) {
        let elements: Vec<String> = self.inner.elements.borrow().keys().cloned().collect();
        for id in elements {
            self.cancel_element(&id);
        }
        self.inner.expressions.borrow_mut().clear();
    }
}
