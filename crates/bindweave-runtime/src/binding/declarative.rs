#![forbid(unsafe_code)]

//! Declarative binding orchestrator.
//!
//! [`Declarative::process_all`] walks an element subtree, parses every bind
//! attribute it finds, and establishes one binding per declaration. The
//! returned [`Completion`] settles once every piece of setup work of the
//! pass has finished.
//!
//! # Pass lifecycle
//!
//! ```text
//! enumerate candidates ─▶ per candidate: cancel cached bindings,
//!        │                 parse, schedule one setup task per declaration,
//!        │                 hand containers to the activator
//!        ▼
//! release the pass's own count ─▶ ... setup tasks run ... ─▶ count hits 0
//!                                                               │
//!                                        resolve, or fail with ProcessError
//! ```
//!
//! # Invariants
//!
//! 1. The pending count starts at one for the pass itself and is matched by
//!    exactly one decrement per increment. The completion fires once.
//! 2. A candidate that fails (parse error, failing initializer, failing
//!    container) is recorded; its siblings are still processed.
//! 3. A declaration targeting exactly `id` never reaches setup.
//! 4. Descendants of a control container are only bound through the
//!    activator.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bindweave_core::{Completion, CompletionState, Priority, Scheduler};

use super::cache::BindingCache;
use super::handle::BindingHandle;
use super::initializers::{
    Initializer, InitializerContext, assign_once, builtins, field_writer, live_bind,
};
use super::parser::{BindingDeclaration, InitializerRef, resolve_initializer};
use crate::config::BindingConfig;
use crate::dom::{Document, ElementRef};
use crate::error::{BindingError, CandidateFailure, ProcessError};
use crate::reactive::{WeakRefTable, element_id, is_observable_path};
use crate::value::Value;

/// Completion of one orchestration pass.
pub type PassCompletion = Completion<(), ProcessError>;

/// Hooks for elements that instantiate their own content.
pub trait ControlActivator {
    /// Whether `element` is a declarative control container.
    fn is_container(&self, element: &ElementRef) -> bool;

    /// Activate the control on `element`. `binder` binds its content with
    /// the same data context, cache and default initializer.
    fn bind_container(&self, element: &ElementRef, binder: ContainerBinder) -> PassCompletion;
}

/// Callback handed to a [`ControlActivator`] to bind a container's content.
#[derive(Clone)]
pub struct ContainerBinder {
    declarative: Declarative,
    container: ElementRef,
    data_context: Value,
    cache: BindingCache,
    default_initializer: Option<Initializer>,
}

impl fmt::Debug for ContainerBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBinder")
            .field("container", &self.container.describe())
            .finish()
    }
}

impl ContainerBinder {
    #[must_use]
    pub fn container(&self) -> &ElementRef {
        &self.container
    }

    #[must_use]
    pub fn data_context(&self) -> &Value {
        &self.data_context
    }

    fn options(&self, root: &ElementRef, skip_root: bool) -> ProcessOptions {
        let mut options = ProcessOptions::new()
            .with_root(root.clone())
            .with_data_context(self.data_context.clone())
            .with_cache(self.cache.clone())
            .skip_root(skip_root);
        if let Some(initializer) = &self.default_initializer {
            options = options.with_default_initializer(initializer.clone());
        }
        options
    }

    /// Bind the container's descendants.
    pub fn bind_children(&self) -> PassCompletion {
        self.declarative
            .process_all(self.options(&self.container, true))
    }

    /// Bind `root` and its descendants, e.g. content the control created
    /// outside its own subtree.
    pub fn bind(&self, root: &ElementRef) -> PassCompletion {
        self.declarative.process_all(self.options(root, false))
    }
}

/// Arguments to [`Declarative::process_all`].
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    root: Option<ElementRef>,
    data_context: Option<Value>,
    skip_root: bool,
    cache: Option<BindingCache>,
    default_initializer: Option<Initializer>,
}

impl ProcessOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subtree to process. Defaults to the document root.
    #[must_use]
    pub fn with_root(mut self, root: ElementRef) -> Self {
        self.root = Some(root);
        self
    }

    /// Object source paths are read from. Defaults to the initializer
    /// namespace.
    #[must_use]
    pub fn with_data_context(mut self, data: impl Into<Value>) -> Self {
        self.data_context = Some(data.into());
        self
    }

    /// Process only the root's descendants.
    #[must_use]
    pub fn skip_root(mut self, skip: bool) -> Self {
        self.skip_root = skip;
        self
    }

    /// Share parses and binding bookkeeping with other passes.
    #[must_use]
    pub fn with_cache(mut self, cache: BindingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Initializer for declarations that name none.
    #[must_use]
    pub fn with_default_initializer(mut self, initializer: Initializer) -> Self {
        self.default_initializer = Some(initializer);
        self
    }
}

struct CounterState {
    count: Cell<usize>,
    fired: Cell<bool>,
    failures: RefCell<Vec<CandidateFailure>>,
    completion: PassCompletion,
}

/// Outstanding-work barrier for one pass.
#[derive(Clone)]
struct PendingCounter {
    state: Rc<CounterState>,
}

impl PendingCounter {
    /// A counter holding one count for the pass itself.
    fn new() -> Self {
        Self {
            state: Rc::new(CounterState {
                count: Cell::new(1),
                fired: Cell::new(false),
                failures: RefCell::new(Vec::new()),
                completion: Completion::pending(),
            }),
        }
    }

    fn completion(&self) -> PassCompletion {
        self.state.completion.clone()
    }

    fn increment(&self) {
        self.state.count.set(self.state.count.get() + 1);
    }

    fn fail(&self, element: &ElementRef, error: BindingError) {
        tracing::error!(
            target: "bindweave::declarative",
            element = %element.describe(),
            error = %error,
            "binding failed"
        );
        self.state.failures.borrow_mut().push(CandidateFailure {
            element: element.describe(),
            error,
        });
    }

    /// Carry failures of a nested pass, already logged there.
    fn absorb(&self, failures: &[CandidateFailure]) {
        self.state
            .failures
            .borrow_mut()
            .extend(failures.iter().cloned());
    }

    fn decrement(&self) {
        let count = self.state.count.get();
        if count == 0 {
            tracing::error!(target: "bindweave::declarative", "pending counter underflow");
            return;
        }
        self.state.count.set(count - 1);
        if count == 1 && !self.state.fired.replace(true) {
            let failures = std::mem::take(&mut *self.state.failures.borrow_mut());
            if failures.is_empty() {
                self.state.completion.resolve(());
            } else {
                self.state.completion.fail(ProcessError { failures });
            }
        }
    }
}

enum Outcome {
    /// A cancelable binding was established.
    Tracked(BindingHandle),
    /// An initializer ran but left nothing to cancel.
    Untracked,
    /// A one-time assignment.
    Assigned,
}

/// The orchestrator. Clones share the document, scheduler and table.
#[derive(Clone)]
pub struct Declarative {
    document: Document,
    scheduler: Scheduler,
    weak_refs: WeakRefTable,
    config: Rc<BindingConfig>,
    activator: Option<Rc<dyn ControlActivator>>,
    initializers: Value,
}

impl fmt::Debug for Declarative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declarative")
            .field("bind_attribute", &self.config.bind_attribute)
            .field("control_attribute", &self.config.control_attribute)
            .field("activator", &self.activator.is_some())
            .finish()
    }
}

impl Declarative {
    /// Create an orchestrator. Initializers default to the built-in set.
    #[must_use]
    pub fn new(
        document: &Document,
        scheduler: &Scheduler,
        weak_refs: &WeakRefTable,
        config: BindingConfig,
    ) -> Self {
        Self {
            document: document.clone(),
            scheduler: scheduler.clone(),
            weak_refs: weak_refs.clone(),
            config: Rc::new(config),
            activator: None,
            initializers: Value::from(builtins()),
        }
    }

    #[must_use]
    pub fn with_activator(mut self, activator: Rc<dyn ControlActivator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Namespace initializer names are resolved against.
    #[must_use]
    pub fn with_initializers(mut self, initializers: impl Into<Value>) -> Self {
        self.initializers = initializers.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    #[must_use]
    pub fn initializers(&self) -> &Value {
        &self.initializers
    }

    fn is_container(&self, element: &ElementRef) -> bool {
        element.has_attribute(&self.config.control_attribute)
            || self
                .activator
                .as_ref()
                .is_some_and(|activator| activator.is_container(element))
    }

    fn is_candidate(&self, element: &ElementRef) -> bool {
        element.has_attribute(&self.config.bind_attribute) || self.is_container(element)
    }

    /// Elements a pass over `root` would process, in document order.
    #[must_use]
    pub fn candidates(&self, root: &ElementRef, skip_root: bool) -> Vec<ElementRef> {
        let mut out = Vec::new();
        let mut stack: Vec<(ElementRef, bool)> = vec![(root.clone(), !skip_root)];
        while let Some((element, include)) = stack.pop() {
            if include && self.is_candidate(&element) {
                let container = self.is_container(&element);
                out.push(element.clone());
                if container {
                    continue;
                }
            }
            stack.extend(element.children().into_iter().rev().map(|child| (child, true)));
        }
        out
    }

    /// Bind every candidate below `options.root`.
    pub fn process_all(&self, options: ProcessOptions) -> PassCompletion {
        let root = options
            .root
            .unwrap_or_else(|| self.document.root().clone());
        let data = options
            .data_context
            .unwrap_or_else(|| self.initializers.clone());
        let cache = options.cache.unwrap_or_default();
        let default_initializer = options.default_initializer;

        let counter = PendingCounter::new();
        let candidates = self.candidates(&root, options.skip_root);
        tracing::debug!(
            target: "bindweave::declarative",
            root = %root.describe(),
            candidates = candidates.len(),
            "binding pass started"
        );

        for element in &candidates {
            counter.increment();
            self.process_candidate(element, &data, &cache, default_initializer.as_ref(), &counter);
            counter.decrement();
        }

        let completion = counter.completion();
        counter.decrement();
        completion
    }

    fn process_candidate(
        &self,
        element: &ElementRef,
        data: &Value,
        cache: &BindingCache,
        default_initializer: Option<&Initializer>,
        counter: &PendingCounter,
    ) {
        let id = element_id(element);
        cache.cancel_element(&id);

        if let Some(text) = element.attribute(&self.config.bind_attribute) {
            match cache.declarations(&text, &self.initializers) {
                Ok(declarations) => {
                    cache.touch(&id);
                    for declaration in declarations.iter() {
                        self.schedule_setup(element, &id, declaration, data, cache, default_initializer, counter);
                    }
                }
                Err(err) => counter.fail(element, BindingError::from(err)),
            }
        }

        if self.is_container(element) {
            self.activate(element, data, cache, default_initializer, counter);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_setup(
        &self,
        element: &ElementRef,
        id: &str,
        declaration: &BindingDeclaration,
        data: &Value,
        cache: &BindingCache,
        default_initializer: Option<&Initializer>,
        counter: &PendingCounter,
    ) {
        counter.increment();
        let this = self.clone();
        let element = element.clone();
        let id = id.to_owned();
        let declaration = declaration.clone();
        let data = data.clone();
        let cache = cache.clone();
        let default_initializer = default_initializer.cloned();
        let counter = counter.clone();
        self.scheduler
            .schedule(Priority::High, "bind:setup", move || {
                let _pass = this.weak_refs.bulk_pass();
                match this.bind_declaration(&element, &declaration, &data, default_initializer.as_ref()) {
                    Ok(Outcome::Tracked(handle)) => cache.record(&id, Some(handle)),
                    Ok(Outcome::Untracked) => cache.record(&id, None),
                    Ok(Outcome::Assigned) => {}
                    Err(err) => counter.fail(&element, err),
                }
                counter.decrement();
            });
    }

    fn initializer_for(
        &self,
        declaration: &BindingDeclaration,
        default_initializer: Option<&Initializer>,
    ) -> Option<Initializer> {
        match &declaration.initializer {
            Some(InitializerRef::Resolved(initializer)) => Some(initializer.clone()),
            Some(InitializerRef::Unresolved(path)) => {
                let expression = path.to_string();
                resolve_initializer(path, &self.initializers, &expression)
                    .or_else(|| default_initializer.cloned())
            }
            None => default_initializer.cloned(),
        }
    }

    fn bind_declaration(
        &self,
        element: &ElementRef,
        declaration: &BindingDeclaration,
        data: &Value,
        default_initializer: Option<&Initializer>,
    ) -> Result<Outcome, BindingError> {
        let ctx = InitializerContext {
            source: data,
            source_path: &declaration.source,
            target: element,
            target_path: &declaration.destination,
            weak_refs: &self.weak_refs,
        };

        if let Some(initializer) = self.initializer_for(declaration, default_initializer) {
            tracing::trace!(
                target: "bindweave::declarative",
                initializer = initializer.name(),
                destination = %declaration.destination,
                "running initializer"
            );
            return match initializer.invoke(&ctx) {
                Ok(Some(handle)) => Ok(Outcome::Tracked(handle)),
                Ok(None) => Ok(Outcome::Untracked),
                Err(err) => Err(err),
            };
        }

        let write = field_writer(&declaration.destination);
        if is_observable_path(data, declaration.source.segments()) {
            if let Some(handle) = live_bind(&ctx, write) {
                return Ok(Outcome::Tracked(handle));
            }
            return Ok(Outcome::Assigned);
        }
        assign_once(&ctx, &write);
        Ok(Outcome::Assigned)
    }

    fn activate(
        &self,
        element: &ElementRef,
        data: &Value,
        cache: &BindingCache,
        default_initializer: Option<&Initializer>,
        counter: &PendingCounter,
    ) {
        let Some(activator) = &self.activator else {
            tracing::debug!(
                target: "bindweave::declarative",
                element = %element.describe(),
                "control container without an activator; content left unbound"
            );
            return;
        };
        let binder = ContainerBinder {
            declarative: self.clone(),
            container: element.clone(),
            data_context: data.clone(),
            cache: cache.clone(),
            default_initializer: default_initializer.cloned(),
        };
        counter.increment();
        let activation = activator.bind_container(element, binder);
        let counter = counter.clone();
        let element = element.clone();
        activation.on_settle(move |state| {
            match state {
                CompletionState::Failed(err) => counter.absorb(&err.failures),
                CompletionState::Canceled => {
                    tracing::debug!(
                        target: "bindweave::declarative",
                        element = %element.describe(),
                        "container activation canceled"
                    );
                }
                CompletionState::Pending | CompletionState::Resolved(()) => {}
            }
            counter.decrement();
        });
    }
}
