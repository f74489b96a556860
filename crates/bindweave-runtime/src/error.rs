#![forbid(unsafe_code)]

//! Error types for binding resolution and orchestration.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | [`BindingError::Parse`] | Malformed expression | That element's bindings are skipped |
//! | [`BindingError::UnsupportedDestination`] | Destination is exactly `id` | Declaration dropped, `warn!` |
//! | [`BindingError::UnresolvedInitializer`] | Initializer name not found | Declaration kept without initializer, `warn!` |
//! | [`BindingError::ElementNotFound`] | Destination element no longer live | Binding cancels itself, `info!` |
//! | [`BindingError::InvalidDestination`] | Missing or element-typed intermediate | That write is skipped, `warn!` |
//! | [`BindingError::Listener`] | A listener returned an error | Logged, other listeners still run |
//!
//! Variants that do not fail a pass are still built and attached to their
//! diagnostic as the `error` field.

use std::fmt;

use crate::binding::parser::ParseError;

/// Errors from reading or writing through a [`Path`](crate::binding::Path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path has no segments.
    Empty,
    /// An intermediate segment did not resolve to a value.
    MissingSegment { path: String, segment: String },
    /// An intermediate segment resolved to an element node; nested writes
    /// through elements are refused.
    ElementIntermediate { path: String, segment: String },
    /// A segment was applied to a value that has no fields.
    NotAContainer { path: String, segment: String },
    /// A list index was past the end of the list.
    IndexOutOfBounds { path: String, index: usize, len: usize },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty path"),
            Self::MissingSegment { path, segment } => {
                write!(f, "'{segment}' is missing while resolving '{path}'")
            }
            Self::ElementIntermediate { path, segment } => {
                write!(f, "'{segment}' in '{path}' is an element; nested writes through elements are refused")
            }
            Self::NotAContainer { path, segment } => {
                write!(f, "cannot apply '{segment}' in '{path}' to a value without fields")
            }
            Self::IndexOutOfBounds { path, index, len } => {
                write!(f, "index {index} out of bounds (len {len}) in '{path}'")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Errors raised while binding a single declaration or element.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    /// The binding expression could not be parsed.
    Parse(ParseError),
    /// The declaration targets the element's `id`.
    UnsupportedDestination { expression: String },
    /// The initializer path did not resolve to an initializer.
    UnresolvedInitializer { path: String },
    /// The destination element could not be resolved by id.
    ElementNotFound { id: String },
    /// The destination path could not be written.
    InvalidDestination(PathError),
    /// A change listener reported a failure.
    Listener(String),
    /// An initializer reported a failure.
    Initializer { name: String, message: String },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::UnsupportedDestination { expression } => {
                write!(f, "binding to 'id' is not supported: {expression}")
            }
            Self::UnresolvedInitializer { path } => {
                write!(f, "initializer '{path}' could not be resolved")
            }
            Self::ElementNotFound { id } => write!(f, "element '{id}' is no longer available"),
            Self::InvalidDestination(err) => write!(f, "invalid destination: {err}"),
            Self::Listener(msg) => write!(f, "listener failed: {msg}"),
            Self::Initializer { name, message } => {
                write!(f, "initializer '{name}' failed: {message}")
            }
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidDestination(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for BindingError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<PathError> for BindingError {
    fn from(err: PathError) -> Self {
        Self::InvalidDestination(err)
    }
}

/// One element that failed during an orchestration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFailure {
    /// Human-readable description of the element (tag and id).
    pub element: String,
    /// What went wrong.
    pub error: BindingError,
}

/// Failure of a whole orchestration pass.
///
/// Every candidate is attempted; this lists the ones that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessError {
    pub failures: Vec<CandidateFailure>,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} element(s) failed to bind", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.element, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_display_names_segment() {
        let err = PathError::ElementIntermediate {
            path: "owner.title".into(),
            segment: "owner".into(),
        };
        let text = err.to_string();
        assert!(text.contains("'owner'"));
        assert!(text.contains("owner.title"));
    }

    #[test]
    fn process_error_lists_failures() {
        let err = ProcessError {
            failures: vec![CandidateFailure {
                element: "span#a".into(),
                error: BindingError::ElementNotFound { id: "a".into() },
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 element(s) failed to bind; span#a: element 'a' is no longer available"
        );
    }
}
