#![forbid(unsafe_code)]

//! Live subscriptions along multi-segment source paths.
//!
//! Observing `user.address.city` subscribes to `user` on the root object, to
//! `address` on whatever `user` currently is, and to `city` below that. When
//! an intermediate value changes, everything downstream of it is torn down and
//! re-established on the new value, then the sink receives the new leaf.
//!
//! Plain objects and lists along the way are read once; only observable
//! levels produce subscriptions. A path with no observable level is not live.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::observable::{Listener, Observable};
use super::record::{ObjectRef, ObservableObject};
use crate::binding::path::{PathSegment, read_segment};
use crate::error::BindingError;
use crate::value::Value;

/// Receives each resolved leaf value.
pub type PathSink = Rc<dyn Fn(&Value) -> Result<(), BindingError>>;

enum Link {
    /// Leaf delivered to the sink.
    Resolved,
    /// The path stopped at a missing or non-container value.
    Unresolved,
    /// A plain level read once.
    Static(Box<Link>),
    /// An observable level with a registered listener.
    Live {
        object: Rc<ObservableObject>,
        property: String,
        listener: Listener,
        child: Rc<RefCell<Option<Link>>>,
    },
}

impl Link {
    fn is_live(&self) -> bool {
        match self {
            Self::Live { .. } => true,
            Self::Static(inner) => inner.is_live(),
            Self::Resolved | Self::Unresolved => false,
        }
    }

    fn cancel(self) {
        match self {
            Self::Live {
                object,
                property,
                listener,
                child,
            } => {
                object.unbind(&property, &listener);
                let downstream = child.borrow_mut().take();
                if let Some(downstream) = downstream {
                    downstream.cancel();
                }
            }
            Self::Static(inner) => inner.cancel(),
            Self::Resolved | Self::Unresolved => {}
        }
    }
}

fn attach(value: &Value, segments: &[PathSegment], sink: &PathSink, alive: &Rc<Cell<bool>>) -> Link {
    let Some((segment, rest)) = segments.split_first() else {
        if let Err(err) = sink(value) {
            tracing::error!(target: "bindweave::observable", error = %err, "path sink failed");
        }
        return Link::Resolved;
    };

    if let Value::Object(ObjectRef::Observable(object)) = value {
        let property = segment.key().into_owned();
        let child: Rc<RefCell<Option<Link>>> = Rc::default();
        let listener = {
            let child = Rc::clone(&child);
            let sink = Rc::clone(sink);
            let alive = Rc::clone(alive);
            let rest: Rc<[PathSegment]> = rest.into();
            Listener::new(move |new, _old| {
                if !alive.get() {
                    return Ok(());
                }
                let previous = child.borrow_mut().take();
                if let Some(previous) = previous {
                    previous.cancel();
                }
                let link = attach(new, &rest, &sink, &alive);
                if alive.get() {
                    *child.borrow_mut() = Some(link);
                } else {
                    // The sink canceled the whole subscription mid-attach.
                    link.cancel();
                }
                Ok(())
            })
        };
        object.bind(&property, &listener);
        return Link::Live {
            object: Rc::clone(object),
            property,
            listener,
            child,
        };
    }

    match read_segment(value, segment) {
        Some(next) => Link::Static(Box::new(attach(&next, rest, sink, alive))),
        None => {
            tracing::debug!(
                target: "bindweave::observable",
                segment = %segment,
                found = value.type_name(),
                "source path unresolved"
            );
            Link::Unresolved
        }
    }
}

/// Handle to a live path subscription.
pub struct PathSubscription {
    root: RefCell<Option<Link>>,
    alive: Rc<Cell<bool>>,
}

impl PathSubscription {
    /// Unsubscribe every level. Idempotent.
    pub fn cancel(&self) {
        self.alive.set(false);
        let root = self.root.borrow_mut().take();
        if let Some(root) = root {
            root.cancel();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.alive.get()
    }
}

impl fmt::Debug for PathSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSubscription")
            .field("active", &self.alive.get())
            .finish()
    }
}

/// Deliver the value at `path` below `root` to `sink`, now and on every
/// change of any observable level.
///
/// The first delivery happens synchronously. Returns `None` if no level of
/// the path is observable; the sink has then received its only value (or
/// nothing, if the path did not resolve).
pub fn observe_path(root: &Value, path: &[PathSegment], sink: PathSink) -> Option<PathSubscription> {
    let alive = Rc::new(Cell::new(true));
    let link = attach(root, path, &sink, &alive);
    if !link.is_live() {
        return None;
    }
    let subscription = PathSubscription {
        root: RefCell::new(Some(link)),
        alive,
    };
    if !subscription.is_active() {
        subscription.cancel();
    }
    Some(subscription)
}

/// Whether observing `path` below `root` would produce a live subscription.
#[must_use]
pub fn is_observable_path(root: &Value, path: &[PathSegment]) -> bool {
    let mut current = root.clone();
    for segment in path {
        if matches!(current, Value::Object(ObjectRef::Observable(_))) {
            return true;
        }
        match read_segment(&current, segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}
