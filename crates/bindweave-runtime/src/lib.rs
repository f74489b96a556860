#![forbid(unsafe_code)]

//! Declarative data binding for bindweave.
//!
//! This crate provides:
//! - [`Value`] and the [`dom`] element tree bindings write into
//! - [`reactive`]: observable records with coalesced asynchronous
//!   notification, live path subscriptions, and the weak reference table
//! - [`binding`]: the expression parser, built-in initializers, and the
//!   [`Declarative`] orchestrator
//! - [`BindingConfig`] for attribute names and weak reference tunables
//!   (TOML loading behind the `policy-config` feature)

pub mod binding;
pub mod config;
pub mod dom;
pub mod error;
pub mod reactive;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;

pub use binding::{
    BindingCache, BindingDeclaration, BindingHandle, ContainerBinder, ControlActivator, Declarative,
    Initializer, InitializerContext, ParseError, Path, PathSegment, ProcessOptions, parse,
    parse_strict,
};
pub use config::{BindingConfig, ConfigError, SweepTrigger, WeakRefConfig, WeakRefMode};
pub use dom::{Document, ElementRef};
pub use error::{BindingError, CandidateFailure, PathError, ProcessError};
pub use reactive::{
    DynamicRecord, Listener, Observable, ObjectRef, ObservableObject, WeakRefTable, observe_path,
};
pub use value::{ListRef, Value};
