#![forbid(unsafe_code)]

//! Execution primitives for bindweave.
//!
//! This crate provides:
//! - [`Scheduler`] for cooperative, priority-queued task execution
//! - [`Completion`] for single-shot, cancelable results
//! - [`Clock`] implementations for deterministic or wall-clock time
//! - `testing` helpers (feature `test-helpers`) for driving time by hand

pub mod clock;
pub mod completion;
pub mod scheduler;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{Completion, CompletionState};
pub use scheduler::{CancelToken, Priority, Scheduler, TaskHandle, TaskId};
