#![forbid(unsafe_code)]

//! bindweave public facade.
//!
//! Keeps element fields in sync with an observable data model through
//! declarative binding expressions:
//!
//! ```ignore
//! use bindweave::prelude::*;
//!
//! let engine = Engine::new(BindingConfig::default())?;
//! let user = engine.observable().with("name", "Ann");
//! let label = ElementRef::new("span").with_attribute("data-bind", "label: user.name");
//! engine.document().root().append_child(&label);
//!
//! let data = ObjectRef::plain().with("user", user.clone());
//! engine.process_all(ProcessOptions::new().with_data_context(data));
//! engine.run_until_idle();
//! ```

use std::rc::Rc;

pub use bindweave_core;
pub use bindweave_runtime;

use bindweave_core::{Clock, Scheduler, SystemClock};
use bindweave_runtime::binding::PassCompletion;
use bindweave_runtime::{
    BindingConfig, ConfigError, ControlActivator, Declarative, Document, ObjectRef,
    ProcessOptions, Value, WeakRefTable,
};

/// Everything needed to bind one document.
#[derive(Debug, Clone)]
pub struct Engine {
    document: Document,
    scheduler: Scheduler,
    weak_refs: WeakRefTable,
    declarative: Declarative,
}

impl Engine {
    /// Build an engine on the wall clock.
    pub fn new(config: BindingConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    /// Build an engine whose scheduler reads `clock`.
    pub fn with_clock(config: BindingConfig, clock: Rc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_scheduler(config, Scheduler::with_clock(clock))
    }

    /// Build an engine around an existing scheduler.
    pub fn with_scheduler(config: BindingConfig, scheduler: Scheduler) -> Result<Self, ConfigError> {
        config.validate()?;
        let document = Document::new();
        let weak_refs = WeakRefTable::new(&document, &scheduler, config.weak_refs.clone());
        tracing::debug!(
            target: "bindweave::declarative",
            bind_attribute = %config.bind_attribute,
            mode = ?config.weak_refs.mode,
            "engine created"
        );
        let declarative = Declarative::new(&document, &scheduler, &weak_refs, config);
        Ok(Self {
            document,
            scheduler,
            weak_refs,
            declarative,
        })
    }

    #[must_use]
    pub fn with_activator(mut self, activator: Rc<dyn ControlActivator>) -> Self {
        self.declarative = self.declarative.with_activator(activator);
        self
    }

    #[must_use]
    pub fn with_initializers(mut self, initializers: impl Into<Value>) -> Self {
        self.declarative = self.declarative.with_initializers(initializers);
        self
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn weak_refs(&self) -> &WeakRefTable {
        &self.weak_refs
    }

    #[must_use]
    pub fn declarative(&self) -> &Declarative {
        &self.declarative
    }

    /// A new, empty observable object notifying through this engine.
    #[must_use]
    pub fn observable(&self) -> ObjectRef {
        ObjectRef::observable(&self.scheduler)
    }

    pub fn process_all(&self, options: ProcessOptions) -> PassCompletion {
        self.declarative.process_all(options)
    }

    /// Drain every ready task. Returns the number run.
    pub fn run_until_idle(&self) -> usize {
        self.scheduler.run_until_idle()
    }
}

pub mod prelude {
    pub use crate::Engine;
    pub use bindweave_core::{Completion, CompletionState, ManualClock, Priority, Scheduler};
    pub use bindweave_runtime::binding::{Initializer, InitializerContext, PassCompletion};
    pub use bindweave_runtime::{
        BindingCache, BindingConfig, BindingError, BindingHandle, ContainerBinder,
        ControlActivator, Document, DynamicRecord, ElementRef, ListRef, Listener, ObjectRef,
        Observable, ProcessError, ProcessOptions, Value, WeakRefConfig, WeakRefMode,
        WeakRefTable,
    };
}
