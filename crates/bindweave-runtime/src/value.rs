#![forbid(unsafe_code)]

//! Dynamically-typed values flowing through bindings.
//!
//! Primitive variants compare structurally. Reference variants ([`ListRef`],
//! [`ObjectRef`], [`ElementRef`], [`Initializer`]) compare by identity, which
//! is what change detection in
//! [`DynamicRecord::update_property`](crate::reactive::DynamicRecord::update_property)
//! relies on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::binding::Initializer;
use crate::dom::ElementRef;
use crate::reactive::ObjectRef;

/// A bindable value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(ListRef),
    Object(ObjectRef),
    Element(ElementRef),
    Initializer(Initializer),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Element(_) => "element",
            Self::Initializer(_) => "initializer",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_element(&self) -> Option<&ElementRef> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_initializer(&self) -> Option<&Initializer> {
        match self {
            Self::Initializer(initializer) => Some(initializer),
            _ => None,
        }
    }

    /// Render the value the way an element attribute stores it.
    ///
    /// `Null` renders as an empty string; whole numbers drop the fraction.
    #[must_use]
    pub fn to_attribute_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{n:.0}"),
            Self::Number(n) => n.to_string(),
            Self::Text(text) => text.clone(),
            Self::List(list) => list
                .to_vec()
                .iter()
                .map(Value::to_attribute_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object]".to_string(),
            Self::Element(element) => element.describe(),
            Self::Initializer(initializer) => format!("[initializer {}]", initializer.name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Element(a), Self::Element(b)) => a.ptr_eq(b),
            (Self::Initializer(a), Self::Initializer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Text(text) => write!(f, "Text({text:?})"),
            Self::List(list) => f.debug_tuple("List").field(&list.len()).finish(),
            Self::Object(object) => f
                .debug_tuple("Object")
                .field(&if object.is_observable() { "observable" } else { "plain" })
                .finish(),
            Self::Element(element) => write!(f, "Element({})", element.describe()),
            Self::Initializer(initializer) => write!(f, "Initializer({})", initializer.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<ListRef> for Value {
    fn from(list: ListRef) -> Self {
        Self::List(list)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

impl From<ElementRef> for Value {
    fn from(element: ElementRef) -> Self {
        Self::Element(element)
    }
}

impl From<Initializer> for Value {
    fn from(initializer: Initializer) -> Self {
        Self::Initializer(initializer)
    }
}

/// Shared, mutable list of values.
#[derive(Clone, Default)]
pub struct ListRef(Rc<RefCell<Vec<Value>>>);

impl ListRef {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Replace the item at `index`. Returns `false` when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Into<Value>> FromIterator<T> for ListRef {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_structurally() {
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_eq!(Value::from(2), Value::Number(2.0));
        assert_ne!(Value::from(true), Value::from("true"));
        assert_eq!(Value::Null, Value::default());
    }

    #[test]
    fn lists_compare_by_identity() {
        let a: ListRef = [1, 2].into_iter().collect();
        let b: ListRef = [1, 2].into_iter().collect();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn attribute_rendering() {
        assert_eq!(Value::Null.to_attribute_string(), "");
        assert_eq!(Value::from(3).to_attribute_string(), "3");
        assert_eq!(Value::from(2.5).to_attribute_string(), "2.5");
        let list: ListRef = ["x", "y"].into_iter().collect();
        assert_eq!(Value::from(list).to_attribute_string(), "x,y");
    }

    #[test]
    fn list_set_reports_bounds() {
        let list: ListRef = [1].into_iter().collect();
        assert!(list.set(0, Value::from(9)));
        assert!(!list.set(1, Value::from(9)));
        assert_eq!(list.get(0), Some(Value::from(9)));
    }
}
