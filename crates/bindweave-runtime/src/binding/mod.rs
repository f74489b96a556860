#![forbid(unsafe_code)]

//! Binding expressions and the declarative orchestrator.

pub mod cache;
pub mod declarative;
pub mod handle;
pub mod initializers;
pub mod lexer;
pub mod parser;
pub mod path;

pub use cache::{BindingCache, ElementBindings};
pub use declarative::{ContainerBinder, ControlActivator, Declarative, PassCompletion, ProcessOptions};
pub use handle::BindingHandle;
pub use initializers::{
    BindingInitializer, Initializer, InitializerContext, InitializerResult, TargetWriter, builtins,
};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::{BindingDeclaration, InitializerRef, ParseError, parse, parse_strict};
pub use path::{Path, PathSegment};
