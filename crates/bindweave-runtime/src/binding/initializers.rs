#![forbid(unsafe_code)]

//! Binding strategies.
//!
//! A declaration without an initializer is bound directly: live when some
//! level of its source path is observable, by a single assignment otherwise.
//! An [`Initializer`] replaces that choice with its own behavior. It returns
//! a [`BindingHandle`] when it established something cancelable, or `None`
//! when nothing needs tracking.
//!
//! Live bindings never capture their destination element. They capture its
//! weak reference id and resolve it on every delivery; once it stops
//! resolving the binding cancels itself.

use std::fmt;
use std::rc::Rc;

use super::handle::BindingHandle;
use super::path::Path;
use crate::dom::ElementRef;
use crate::error::BindingError;
use crate::reactive::{ObjectRef, PathSink, WeakRefTable, observe_path};
use crate::value::Value;

/// Everything an initializer sees about one declaration.
pub struct InitializerContext<'a> {
    /// The data context the source path is read from.
    pub source: &'a Value,
    pub source_path: &'a Path,
    /// The element being bound.
    pub target: &'a ElementRef,
    pub target_path: &'a Path,
    pub weak_refs: &'a WeakRefTable,
}

impl InitializerContext<'_> {
    /// Current value of the source path, if it resolves.
    #[must_use]
    pub fn resolve_source(&self) -> Option<Value> {
        self.source_path.read(self.source).ok()
    }
}

impl fmt::Debug for InitializerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializerContext")
            .field("source_path", &self.source_path.to_string())
            .field("target", &self.target.describe())
            .field("target_path", &self.target_path.to_string())
            .finish()
    }
}

/// Result of running an initializer.
pub type InitializerResult = Result<Option<BindingHandle>, BindingError>;

/// Custom binding behavior.
pub trait BindingInitializer {
    fn initialize(&self, ctx: &InitializerContext<'_>) -> InitializerResult;
}

impl<F> BindingInitializer for F
where
    F: Fn(&InitializerContext<'_>) -> InitializerResult,
{
    fn initialize(&self, ctx: &InitializerContext<'_>) -> InitializerResult {
        self(ctx)
    }
}

/// Writes a delivered value into a resolved destination element.
pub type TargetWriter = Rc<dyn Fn(&ElementRef, &Value) -> Result<(), BindingError>>;

/// A named, shareable initializer. Equality is identity.
#[derive(Clone)]
pub struct Initializer {
    name: Rc<str>,
    inner: Rc<dyn BindingInitializer>,
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Initializer").field(&self.name).finish()
    }
}

impl PartialEq for Initializer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Initializer {
    pub fn new(name: &str, initializer: impl BindingInitializer + 'static) -> Self {
        Self {
            name: Rc::from(name),
            inner: Rc::new(initializer),
        }
    }

    /// Wrap a closure as an initializer.
    pub fn from_fn(
        name: &str,
        f: impl Fn(&InitializerContext<'_>) -> InitializerResult + 'static,
    ) -> Self {
        Self::new(name, f)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn invoke(&self, ctx: &InitializerContext<'_>) -> InitializerResult {
        self.inner.initialize(ctx)
    }

    /// Assign the source once, with no live link.
    #[must_use]
    pub fn one_time() -> Self {
        Self::from_fn("oneTime", |ctx| {
            assign_once(ctx, &field_writer(ctx.target_path));
            Ok(None)
        })
    }

    /// Live binding into an attribute named by the destination.
    #[must_use]
    pub fn set_attribute() -> Self {
        Self::from_fn("setAttribute", |ctx| {
            Ok(live_bind(ctx, attribute_writer(ctx.target_path)))
        })
    }

    /// One assignment into an attribute named by the destination.
    #[must_use]
    pub fn set_attribute_one_time() -> Self {
        Self::from_fn("setAttributeOneTime", |ctx| {
            assign_once(ctx, &attribute_writer(ctx.target_path));
            Ok(None)
        })
    }

    /// Live binding that passes each value through `convert` first.
    pub fn converter(name: &str, convert: impl Fn(&Value) -> Value + 'static) -> Self {
        let convert: Rc<dyn Fn(&Value) -> Value> = Rc::new(convert);
        Self::from_fn(name, move |ctx| {
            let write = field_writer(ctx.target_path);
            let convert = Rc::clone(&convert);
            let writer: TargetWriter =
                Rc::new(move |element: &ElementRef, value: &Value| write(element, &convert(value)));
            Ok(live_bind(ctx, writer))
        })
    }
}

/// Writer that stores values through `path` into element fields.
#[must_use]
pub fn field_writer(path: &Path) -> TargetWriter {
    let path = path.clone();
    Rc::new(move |element: &ElementRef, value: &Value| {
        path.write(element, value.clone()).map_err(BindingError::from)
    })
}

/// Writer that stores values as an attribute named by `path`. `Null` removes
/// the attribute.
#[must_use]
pub fn attribute_writer(path: &Path) -> TargetWriter {
    let name = path.to_string();
    Rc::new(move |element: &ElementRef, value: &Value| {
        if value.is_null() {
            element.remove_attribute(&name);
        } else {
            element.set_attribute(&name, value.to_attribute_string());
        }
        Ok(())
    })
}

/// Read the source once and write it. Failures are logged and skipped.
pub fn assign_once(ctx: &InitializerContext<'_>, write: &TargetWriter) {
    let value = match ctx.source_path.read(ctx.source) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(
                target: "bindweave::declarative",
                source = %ctx.source_path,
                error = %err,
                "source unresolved; nothing assigned"
            );
            return;
        }
    };
    if let Err(err) = write(ctx.target, &value) {
        write_skipped(ctx.target, &ctx.target_path.to_string(), &err);
    }
}

/// Shared diagnostic for a destination write that did not happen, whether
/// one-time or live.
fn write_skipped(element: &ElementRef, destination: &str, err: &BindingError) {
    tracing::warn!(
        target: "bindweave::declarative",
        element = %element.describe(),
        destination,
        error = %err,
        "destination write skipped"
    );
}

/// Subscribe `write` to the source path, resolving the destination through
/// the weak reference table on each delivery.
///
/// Returns `None` when no level of the source is observable; the single
/// available value has then been written already.
pub fn live_bind(ctx: &InitializerContext<'_>, write: TargetWriter) -> Option<BindingHandle> {
    let id = ctx.weak_refs.create_ref(ctx.target, None);
    let handle = BindingHandle::new();

    let sink: PathSink = {
        let weak_refs = ctx.weak_refs.clone();
        let handle = handle.clone();
        let destination = ctx.target_path.to_string();
        Rc::new(move |value: &Value| {
            if handle.is_canceled() {
                return Ok(());
            }
            match weak_refs.get_ref_element(&id) {
                Some(element) => {
                    if let Err(err) = write(&element, value) {
                        write_skipped(&element, &destination, &err);
                    }
                    Ok(())
                }
                None => {
                    let err = BindingError::ElementNotFound { id: id.clone() };
                    tracing::info!(
                        target: "bindweave::declarative",
                        destination = %destination,
                        error = %err,
                        "destination element is gone; canceling binding"
                    );
                    handle.cancel();
                    Ok(())
                }
            }
        })
    };

    let subscription = observe_path(ctx.source, ctx.source_path.segments(), sink)?;
    handle.on_cancel(move || subscription.cancel());
    Some(handle)
}

/// The initializers available by name to every binding expression.
#[must_use]
pub fn builtins() -> ObjectRef {
    ObjectRef::plain()
        .with("oneTime", Initializer::one_time())
        .with("setAttribute", Initializer::set_attribute())
        .with("setAttributeOneTime", Initializer::set_attribute_one_time())
}
