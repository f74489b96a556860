#![forbid(unsafe_code)]

//! Per-object listener registry with coalesced, asynchronous notification.
//!
//! An [`ObservableRecord`] tracks, for each property of one data object, the
//! ordered list of [`Listener`]s and at most one in-flight notification.
//!
//! # State machine (per property)
//!
//! ```text
//!            notify                 task runs all listeners
//!   Idle ───────────────▶ Notifying ──────────────────────────▶ Idle
//!                            │  ▲
//!                            └──┘ notify again: cancel + replace
//! ```
//!
//! # Invariants
//!
//! 1. At most one pending notification per property. A new `notify` cancels
//!    the pending one and replaces it; the replacement carries the *original*
//!    old value, so listeners see `(latest, value before the burst)`.
//! 2. Listeners run in registration order, from a scheduled task, never
//!    synchronously inside `notify`.
//! 3. A canceled notification never reaches a listener, and its completion
//!    settles as canceled.
//! 4. Between listeners the task checks whether it was superseded and stops
//!    if so.
//! 5. A listener error is logged; the remaining listeners still run.
//! 6. No internal borrow is held while a listener runs, so listeners may
//!    bind, unbind, or write to the same object.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use bindweave_core::{Completion, CompletionState, Priority, Scheduler, TaskHandle};

use crate::error::BindingError;
use crate::value::Value;

/// Result returned by a listener.
pub type ListenerResult = Result<(), BindingError>;

/// A change callback invoked with `(new_value, old_value)`.
///
/// Identity is by allocation: clones of one `Listener` are the same listener,
/// two `Listener::new` calls with identical closures are not.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Value, &Value) -> ListenerResult>);

impl Listener {
    pub fn new(f: impl Fn(&Value, &Value) -> ListenerResult + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the listener.
    pub fn call(&self, new: &Value, old: &Value) -> ListenerResult {
        (self.0)(new, old)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Observation surface of a data object.
pub trait Observable {
    /// Invoke `listener` once with the current value, then register it for
    /// future changes. Binding the same listener twice is a no-op.
    fn bind(&self, name: &str, listener: &Listener);

    /// Remove one listener from `name`.
    fn unbind(&self, name: &str, listener: &Listener);

    /// Remove every listener of `name` and cancel its pending notification.
    fn unbind_property(&self, name: &str);

    /// Remove every listener and cancel every pending notification.
    fn unbind_all(&self);

    /// Whether any listener is registered for `name`.
    fn has_listeners(&self, name: &str) -> bool;

    /// Schedule a change notification for `name`.
    ///
    /// The completion resolves with `new` once all listeners ran, or is
    /// canceled if a later notification supersedes it.
    fn notify(&self, name: &str, new: Value, old: Value) -> Completion<Value>;
}

struct PendingNotification {
    id: u64,
    new: Value,
    old: Value,
    task: TaskHandle,
    completion: Completion<Value>,
}

impl PendingNotification {
    fn cancel(&self) {
        self.task.cancel();
        self.completion.cancel();
    }
}

struct RecordState {
    scheduler: Scheduler,
    listeners: RefCell<AHashMap<String, Vec<Listener>>>,
    pending: RefCell<AHashMap<String, PendingNotification>>,
    next_id: Cell<u64>,
}

impl RecordState {
    fn is_current(&self, name: &str, id: u64) -> bool {
        self.pending
            .borrow()
            .get(name)
            .is_some_and(|pending| pending.id == id)
    }

    fn is_registered(&self, name: &str, listener: &Listener) -> bool {
        self.listeners
            .borrow()
            .get(name)
            .is_some_and(|list| list.iter().any(|l| l.ptr_eq(listener)))
    }

    fn dispatch(&self, name: &str, id: u64) {
        let (new, old, completion) = {
            let pending = self.pending.borrow();
            match pending.get(name) {
                Some(p) if p.id == id => (p.new.clone(), p.old.clone(), p.completion.clone()),
                _ => return,
            }
        };
        let listeners = self
            .listeners
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(
            target: "bindweave::observable",
            property = name,
            listeners = listeners.len(),
            "dispatching change"
        );

        for listener in &listeners {
            if !self.is_current(name, id) || completion.is_canceled() {
                tracing::trace!(target: "bindweave::observable", property = name, "notification superseded");
                return;
            }
            if !self.is_registered(name, listener) {
                continue;
            }
            if let Err(err) = listener.call(&new, &old) {
                tracing::error!(
                    target: "bindweave::observable",
                    property = name,
                    error = %err,
                    "listener failed"
                );
            }
        }

        let finished = {
            let mut pending = self.pending.borrow_mut();
            if pending.get(name).is_some_and(|p| p.id == id) {
                pending.remove(name);
                true
            } else {
                false
            }
        };
        if finished {
            completion.resolve(new);
        }
    }
}

/// Listener registry and pending-notification table for one object.
#[derive(Clone)]
pub struct ObservableRecord {
    state: Rc<RecordState>,
}

impl fmt::Debug for ObservableRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableRecord")
            .field("properties", &self.state.listeners.borrow().len())
            .field("pending", &self.state.pending.borrow().len())
            .finish()
    }
}

impl ObservableRecord {
    /// Create an empty record that dispatches through `scheduler`.
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            state: Rc::new(RecordState {
                scheduler: scheduler.clone(),
                listeners: RefCell::new(AHashMap::new()),
                pending: RefCell::new(AHashMap::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Append `listener` to `name`. Returns `false` if it was already there.
    pub fn register(&self, name: &str, listener: &Listener) -> bool {
        if self.state.is_registered(name, listener) {
            return false;
        }
        self.state
            .listeners
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .push(listener.clone());
        true
    }

    #[must_use]
    pub fn is_registered(&self, name: &str, listener: &Listener) -> bool {
        self.state.is_registered(name, listener)
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn remove(&self, name: &str, listener: &Listener) -> bool {
        let mut listeners = self.state.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| !l.ptr_eq(listener));
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    /// Drop every listener of `name` and cancel its pending notification.
    pub fn clear_property(&self, name: &str) {
        self.state.listeners.borrow_mut().remove(name);
        let pending = self.state.pending.borrow_mut().remove(name);
        if let Some(pending) = pending {
            pending.cancel();
        }
    }

    /// Drop every listener and cancel every pending notification.
    pub fn clear(&self) {
        self.state.listeners.borrow_mut().clear();
        let pending: Vec<PendingNotification> = self
            .state
            .pending
            .borrow_mut()
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        for pending in pending {
            pending.cancel();
        }
    }

    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.state
            .listeners
            .borrow()
            .get(name)
            .map_or(0, Vec::len)
    }

    #[must_use]
    pub fn has_listeners(&self, name: &str) -> bool {
        self.listener_count(name) > 0
    }

    /// Whether a notification for `name` is scheduled and not yet finished.
    #[must_use]
    pub fn has_pending(&self, name: &str) -> bool {
        self.state.pending.borrow().contains_key(name)
    }

    /// Schedule listeners of `name` to run with `(new, old)`.
    ///
    /// Any pending notification for `name` is canceled first and its old
    /// value carried over. With no listeners, or when the carried old value
    /// equals `new`, this resolves immediately.
    pub fn notify(&self, name: &str, new: Value, old: Value) -> Completion<Value> {
        let superseded = self.state.pending.borrow_mut().remove(name);
        let (old, coalesced) = match superseded {
            Some(previous) => {
                previous.cancel();
                (previous.old.clone(), true)
            }
            None => (old, false),
        };

        if !self.has_listeners(name) {
            return Completion::resolved(new);
        }
        if coalesced && new == old {
            tracing::trace!(
                target: "bindweave::observable",
                property = name,
                "burst returned to its original value"
            );
            return Completion::resolved(new);
        }

        let id = self.state.next_id.get() + 1;
        self.state.next_id.set(id);

        let weak: Weak<RecordState> = Rc::downgrade(&self.state);
        let property = name.to_owned();
        let task = self
            .state
            .scheduler
            .schedule(Priority::Normal, "observable:notify", move || {
                if let Some(state) = weak.upgrade() {
                    state.dispatch(&property, id);
                }
            });
        let completion = Completion::linked(task.token().clone());
        {
            let weak = Rc::downgrade(&self.state);
            let property = name.to_owned();
            completion.on_settle(move |settled| {
                if !matches!(settled, CompletionState::Canceled) {
                    return;
                }
                if let Some(state) = weak.upgrade() {
                    let mut pending = state.pending.borrow_mut();
                    if pending.get(&property).is_some_and(|p| p.id == id) {
                        pending.remove(&property);
                    }
                }
            });
        }
        self.state.pending.borrow_mut().insert(
            name.to_owned(),
            PendingNotification {
                id,
                new,
                old,
                task,
                completion: completion.clone(),
            },
        );
        completion
    }
}
