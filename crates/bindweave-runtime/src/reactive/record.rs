#![forbid(unsafe_code)]

//! Dynamic records and observable data objects.
//!
//! Two capabilities are composed by embedding rather than merged:
//!
//! - [`Record`] is a plain property bag ([`DynamicRecord`] only).
//! - [`ObservableObject`] embeds a `Record` plus an
//!   [`ObservableRecord`](super::ObservableRecord) and implements both
//!   [`DynamicRecord`] and [`Observable`](super::Observable).
//!
//! [`ObjectRef`] is the shared handle stored inside [`Value::Object`].
//!
//! # Write confirmation
//!
//! A `Record` may hold read-only properties; writing one is silently ignored,
//! like assigning a non-writable field in a permissive host. Updates therefore
//! re-read the backing store after writing and only notify when the write
//! actually took effect.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use bindweave_core::{Completion, Scheduler};

use super::observable::{Listener, Observable, ObservableRecord};
use crate::value::Value;

/// Property access and mutation on a dynamic object.
pub trait DynamicRecord {
    /// Current value of `name`, if defined.
    fn get_property(&self, name: &str) -> Option<Value>;

    /// Write `value` to `name` and notify observers if it changed.
    ///
    /// Equal values resolve immediately without notifying.
    fn update_property(&self, name: &str, value: Value) -> Completion<Value>;

    /// Define `name` (if needed) and write `value` to it.
    fn add_property(&self, name: &str, value: Value) -> Completion<Value>;

    /// Delete `name`, notifying observers with `(Null, old)`.
    fn remove_property(&self, name: &str) -> Completion<Value>;

    /// Fire-and-forget form of [`update_property`](Self::update_property).
    fn set_property(&self, name: &str, value: Value) -> &Self
    where
        Self: Sized,
    {
        let _ = self.update_property(name, value);
        self
    }
}

/// Plain property bag.
#[derive(Default)]
pub struct Record {
    fields: RefCell<AHashMap<String, Value>>,
    read_only: RefCell<AHashSet<String>>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.borrow().iter()).finish()
    }
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }

    /// Store `value`. Read-only properties keep their value.
    pub fn store(&self, name: &str, value: Value) {
        if self.read_only.borrow().contains(name) {
            return;
        }
        self.fields.borrow_mut().insert(name.to_owned(), value);
    }

    /// Delete `name`. Read-only properties are not deleted.
    pub fn delete(&self, name: &str) -> Option<Value> {
        if self.read_only.borrow().contains(name) {
            return None;
        }
        self.fields.borrow_mut().remove(name)
    }

    /// Define `name` with a fixed value that later writes cannot change.
    pub fn define_read_only(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_owned(), value);
        self.read_only.borrow_mut().insert(name.to_owned());
    }

    /// Property names, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl DynamicRecord for Record {
    fn get_property(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn update_property(&self, name: &str, value: Value) -> Completion<Value> {
        self.store(name, value);
        Completion::resolved(self.get(name).unwrap_or_default())
    }

    fn add_property(&self, name: &str, value: Value) -> Completion<Value> {
        self.update_property(name, value)
    }

    fn remove_property(&self, name: &str) -> Completion<Value> {
        self.delete(name);
        Completion::resolved(Value::Null)
    }
}

/// A [`Record`] whose changes are observable.
#[derive(Debug)]
pub struct ObservableObject {
    record: Record,
    observers: ObservableRecord,
}

impl ObservableObject {
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            record: Record::new(),
            observers: ObservableRecord::new(scheduler),
        }
    }

    /// The backing store. Writing it directly bypasses notification.
    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub fn observers(&self) -> &ObservableRecord {
        &self.observers
    }
}

impl DynamicRecord for ObservableObject {
    fn get_property(&self, name: &str) -> Option<Value> {
        self.record.get(name)
    }

    fn update_property(&self, name: &str, value: Value) -> Completion<Value> {
        let old = self.record.get(name).unwrap_or_default();
        if old == value {
            return Completion::resolved(value);
        }
        self.record.store(name, value.clone());
        // Read back: read-only properties drop the write silently.
        if self.record.get(name).as_ref() != Some(&value) {
            tracing::debug!(
                target: "bindweave::observable",
                property = name,
                "write did not take effect; not notifying"
            );
            return Completion::resolved(old);
        }
        self.observers.notify(name, value, old)
    }

    fn add_property(&self, name: &str, value: Value) -> Completion<Value> {
        if !self.record.contains(name) {
            self.record.store(name, Value::Null);
        }
        self.update_property(name, value)
    }

    fn remove_property(&self, name: &str) -> Completion<Value> {
        match self.record.delete(name) {
            Some(old) => self.observers.notify(name, Value::Null, old),
            None => Completion::resolved(Value::Null),
        }
    }
}

impl Observable for ObservableObject {
    fn bind(&self, name: &str, listener: &Listener) {
        if self.observers.is_registered(name, listener) {
            return;
        }
        // Out-of-band priming: synchronous, not queued.
        let current = self.record.get(name).unwrap_or_default();
        if let Err(err) = listener.call(&current, &Value::Null) {
            tracing::error!(
                target: "bindweave::observable",
                property = name,
                error = %err,
                "listener failed while priming"
            );
        }
        self.observers.register(name, listener);
    }

    fn unbind(&self, name: &str, listener: &Listener) {
        self.observers.remove(name, listener);
    }

    fn unbind_property(&self, name: &str) {
        self.observers.clear_property(name);
    }

    fn unbind_all(&self) {
        self.observers.clear();
    }

    fn has_listeners(&self, name: &str) -> bool {
        self.observers.has_listeners(name)
    }

    fn notify(&self, name: &str, new: Value, old: Value) -> Completion<Value> {
        self.observers.notify(name, new, old)
    }
}

/// Shared handle to a data object.
#[derive(Clone)]
pub enum ObjectRef {
    Plain(Rc<Record>),
    Observable(Rc<ObservableObject>),
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(record) => f.debug_tuple("Plain").field(record).finish(),
            Self::Observable(object) => f.debug_tuple("Observable").field(&object.record).finish(),
        }
    }
}

impl ObjectRef {
    /// Create an empty plain object.
    #[must_use]
    pub fn plain() -> Self {
        Self::Plain(Rc::new(Record::new()))
    }

    /// Create an empty observable object notifying through `scheduler`.
    #[must_use]
    pub fn observable(scheduler: &Scheduler) -> Self {
        Self::Observable(Rc::new(ObservableObject::new(scheduler)))
    }

    /// Builder: set an initial property without notifying.
    #[must_use]
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.record().store(name, value.into());
        self
    }

    /// The backing store.
    #[must_use]
    pub fn record(&self) -> &Record {
        match self {
            Self::Plain(record) => record,
            Self::Observable(object) => &object.record,
        }
    }

    #[must_use]
    pub fn is_observable(&self) -> bool {
        matches!(self, Self::Observable(_))
    }

    #[must_use]
    pub fn as_observable(&self) -> Option<&Rc<ObservableObject>> {
        match self {
            Self::Observable(object) => Some(object),
            Self::Plain(_) => None,
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Plain(a), Self::Plain(b)) => Rc::ptr_eq(a, b),
            (Self::Observable(a), Self::Observable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Tear down every listener and pending notification. No-op for plain
    /// objects.
    pub fn unbind_all(&self) {
        if let Self::Observable(object) = self {
            object.unbind_all();
        }
    }
}

impl DynamicRecord for ObjectRef {
    fn get_property(&self, name: &str) -> Option<Value> {
        self.record().get(name)
    }

    fn update_property(&self, name: &str, value: Value) -> Completion<Value> {
        match self {
            Self::Plain(record) => record.update_property(name, value),
            Self::Observable(object) => object.update_property(name, value),
        }
    }

    fn add_property(&self, name: &str, value: Value) -> Completion<Value> {
        match self {
            Self::Plain(record) => record.add_property(name, value),
            Self::Observable(object) => object.add_property(name, value),
        }
    }

    fn remove_property(&self, name: &str) -> Completion<Value> {
        match self {
            Self::Plain(record) => record.remove_property(name),
            Self::Observable(object) => object.remove_property(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindweave_core::ManualClock;
    use std::cell::Cell;

    fn scheduler() -> Scheduler {
        Scheduler::with_clock(Rc::new(ManualClock::new()))
    }

    fn counting() -> (Rc<RefCell<Vec<(Value, Value)>>>, Listener) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let c = Rc::clone(&calls);
        let listener = Listener::new(move |new, old| {
            c.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        });
        (calls, listener)
    }

    #[test]
    fn bind_primes_synchronously() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        object.record().store("name", Value::from("Ann"));
        let (calls, listener) = counting();
        object.bind("name", &listener);
        assert_eq!(*calls.borrow(), vec![(Value::from("Ann"), Value::Null)]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn rebinding_same_listener_is_noop() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        let (calls, listener) = counting();
        object.bind("p", &listener);
        object.bind("p", &listener);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(object.observers().listener_count("p"), 1);
    }

    #[test]
    fn burst_of_sets_yields_one_call() {
        let scheduler = scheduler();
        let object = ObjectRef::observable(&scheduler).with("p", "original");
        let (calls, listener) = counting();
        let Some(observable) = object.as_observable() else {
            panic!("expected observable");
        };
        observable.bind("p", &listener);
        calls.borrow_mut().clear();

        object.set_property("p", Value::from("v1"));
        object.set_property("p", Value::from("v2"));
        scheduler.run_until_idle();

        assert_eq!(
            *calls.borrow(),
            vec![(Value::from("v2"), Value::from("original"))]
        );
    }

    #[test]
    fn write_while_unbound_replaces_the_pending_notification() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        let (_, first) = counting();
        object.bind("p", &first);
        let stale = object.update_property("p", Value::from(1));
        object.unbind("p", &first);
        object.update_property("p", Value::from(2));
        assert!(stale.is_canceled());

        let (calls, second) = counting();
        object.bind("p", &second);
        scheduler.run_until_idle();

        assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::Null)]);
        assert_eq!(object.get_property("p"), Some(Value::from(2)));
    }

    #[test]
    fn unbound_listener_never_fires() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        let (calls, listener) = counting();
        object.bind("p", &listener);
        object.unbind("p", &listener);
        object.update_property("p", Value::from(1));
        scheduler.run_until_idle();
        assert_eq!(calls.borrow().len(), 1, "only the priming call");
    }

    #[test]
    fn update_with_equal_value_is_a_resolved_noop() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        object.record().store("p", Value::from(3));
        let (calls, listener) = counting();
        object.bind("p", &listener);
        let done = object.update_property("p", Value::from(3));
        assert!(done.is_resolved());
        assert_eq!(scheduler.pending(), 0);
        scheduler.run_until_idle();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn read_only_write_does_not_notify() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        object.record().define_read_only("fixed", Value::from("a"));
        let (calls, listener) = counting();
        object.bind("fixed", &listener);
        let done = object.update_property("fixed", Value::from("b"));
        scheduler.run_until_idle();
        assert_eq!(done.value(), Some(Value::from("a")));
        assert_eq!(object.get_property("fixed"), Some(Value::from("a")));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn remove_property_notifies_null() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        object.record().store("p", Value::from("x"));
        let (calls, listener) = counting();
        object.bind("p", &listener);
        object.remove_property("p");
        scheduler.run_until_idle();
        assert_eq!(calls.borrow()[1], (Value::Null, Value::from("x")));
        assert!(object.get_property("p").is_none());
    }

    #[test]
    fn add_property_defines_and_notifies() {
        let scheduler = scheduler();
        let object = ObservableObject::new(&scheduler);
        let (calls, listener) = counting();
        object.bind("fresh", &listener);
        let done = object.add_property("fresh", Value::from(1));
        scheduler.run_until_idle();
        assert!(done.is_resolved());
        assert_eq!(calls.borrow()[1], (Value::from(1), Value::Null));
    }

    #[test]
    fn unbind_all_cancels_everything() {
        let scheduler = scheduler();
        let object = ObjectRef::observable(&scheduler);
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let listener = Listener::new(move |_, _| {
            f.set(f.get() + 1);
            Ok(())
        });
        if let Some(observable) = object.as_observable() {
            observable.bind("a", &listener);
            observable.bind("b", &listener);
        }
        let a = object.update_property("a", Value::from(1));
        object.unbind_all();
        scheduler.run_until_idle();
        assert!(a.is_canceled());
        assert_eq!(fired.get(), 2, "priming calls only");
    }

    #[test]
    fn plain_objects_resolve_writes_immediately() {
        let object = ObjectRef::plain();
        let done = object.update_property("x", Value::from(true));
        assert_eq!(done.value(), Some(Value::from(true)));
        assert!(!object.is_observable());
    }
}
