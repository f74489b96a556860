#![forbid(unsafe_code)]

//! Single-shot, cancelable completion signals.
//!
//! A [`Completion`] is the engine's "cancelable future": it starts pending and
//! settles exactly once as resolved, failed, or canceled. Observers register
//! with [`Completion::on_settle`] and are called synchronously when the
//! completion settles (or immediately if it already has). Nothing here polls;
//! progress comes from tasks running on the [`Scheduler`](crate::Scheduler).
//!
//! # Invariants
//!
//! 1. A completion settles at most once. Later `resolve`/`fail`/`cancel`
//!    calls return `false` and change nothing.
//! 2. Settle callbacks run in registration order, exactly once each.
//! 3. No internal borrow is held while a callback runs, so callbacks may
//!    inspect or observe the same completion.
//! 4. Canceling a completion also cancels its linked [`CancelToken`], if any.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use crate::scheduler::CancelToken;

/// The state of a [`Completion`].
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionState<T, E> {
    /// Not settled yet.
    Pending,
    /// Settled successfully.
    Resolved(T),
    /// Settled with an error.
    Failed(E),
    /// Abandoned before producing a value.
    Canceled,
}

impl<T, E> CompletionState<T, E> {
    /// Whether the state is anything other than `Pending`.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

type SettleCallback<T, E> = Box<dyn FnOnce(&CompletionState<T, E>)>;

struct Inner<T, E> {
    state: CompletionState<T, E>,
    callbacks: Vec<SettleCallback<T, E>>,
    token: Option<CancelToken>,
}

/// A shared, single-shot result cell.
///
/// Clones observe and settle the same underlying state.
pub struct Completion<T, E = Infallible> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Completion")
            .field("state", &inner.state)
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Completion<T, E> {
    fn with_state(state: CompletionState<T, E>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state,
                callbacks: Vec::new(),
                token: None,
            })),
        }
    }

    /// Create a pending completion.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_state(CompletionState::Pending)
    }

    /// Create a pending completion whose cancellation also cancels `token`.
    #[must_use]
    pub fn linked(token: CancelToken) -> Self {
        let completion = Self::pending();
        completion.inner.borrow_mut().token = Some(token);
        completion
    }

    /// Create an already-resolved completion.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self::with_state(CompletionState::Resolved(value))
    }

    /// Create an already-failed completion.
    #[must_use]
    pub fn failed(error: E) -> Self {
        Self::with_state(CompletionState::Failed(error))
    }

    /// Create an already-canceled completion.
    #[must_use]
    pub fn canceled() -> Self {
        Self::with_state(CompletionState::Canceled)
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(CompletionState::Resolved(value))
    }

    /// Fail with `error`. Returns `false` if already settled.
    pub fn fail(&self, error: E) -> bool {
        self.settle(CompletionState::Failed(error))
    }

    /// Cancel the completion and its linked token. Returns `false` if already
    /// settled.
    pub fn cancel(&self) -> bool {
        let token = self.inner.borrow().token.clone();
        let settled = self.settle(CompletionState::Canceled);
        if settled {
            if let Some(token) = token {
                token.cancel();
            }
        }
        settled
    }

    fn settle(&self, state: CompletionState<T, E>) -> bool {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                return false;
            }
            inner.state = state.clone();
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback(&state);
        }
        true
    }

    /// Register a callback for when the completion settles.
    ///
    /// Runs immediately if the completion has already settled.
    pub fn on_settle(&self, callback: impl FnOnce(&CompletionState<T, E>) + 'static) {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                Some(inner.state.clone())
            } else {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        };
        if let Some(state) = settled {
            callback(&state);
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> CompletionState<T, E> {
        self.inner.borrow().state.clone()
    }

    /// The resolved value, if any.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        match &self.inner.borrow().state {
            CompletionState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<E> {
        match &self.inner.borrow().state {
            CompletionState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Whether the completion is still pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.inner.borrow().state.is_settled()
    }

    /// Whether the completion resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner.borrow().state, CompletionState::Resolved(_))
    }

    /// Whether the completion failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.inner.borrow().state, CompletionState::Failed(_))
    }

    /// Whether the completion was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.borrow().state, CompletionState::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    #[test]
    fn settles_once() {
        let c: Completion<i32> = Completion::pending();
        assert!(c.resolve(1));
        assert!(!c.resolve(2));
        assert!(!c.cancel());
        assert_eq!(c.value(), Some(1));
    }

    #[test]
    fn callbacks_run_in_order_on_settle() {
        let c: Completion<i32> = Completion::pending();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let log = Rc::clone(&log);
            c.on_settle(move |state| log.borrow_mut().push((tag, state.clone())));
        }
        assert!(log.borrow().is_empty());
        c.resolve(7);
        assert_eq!(
            *log.borrow(),
            vec![
                ("a", CompletionState::Resolved(7)),
                ("b", CompletionState::Resolved(7))
            ]
        );
    }

    #[test]
    fn late_callback_runs_immediately() {
        let c: Completion<(), String> = Completion::failed("boom".into());
        let seen = Rc::new(Cell::new(false));
        let s = Rc::clone(&seen);
        c.on_settle(move |state| s.set(matches!(state, CompletionState::Failed(_))));
        assert!(seen.get());
        assert_eq!(c.error().as_deref(), Some("boom"));
    }

    #[test]
    fn callback_may_inspect_completion() {
        let c: Completion<i32> = Completion::pending();
        let c2 = c.clone();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        c.on_settle(move |_| s.set(c2.value().unwrap_or_default()));
        c.resolve(3);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn cancel_trips_linked_token() {
        let token = CancelToken::new();
        let c: Completion<i32> = Completion::linked(token.clone());
        assert!(c.cancel());
        assert!(token.is_canceled());
        assert!(c.is_canceled());
    }

    proptest! {
        #[test]
        fn first_settlement_wins(ops in proptest::collection::vec(0u8..3, 1..8)) {
            let c: Completion<usize, String> = Completion::pending();
            let calls = Rc::new(Cell::new(0));
            let seen = Rc::clone(&calls);
            c.on_settle(move |_| seen.set(seen.get() + 1));

            for (index, op) in ops.iter().enumerate() {
                let settled = match op {
                    0 => c.resolve(index),
                    1 => c.fail(format!("e{index}")),
                    _ => c.cancel(),
                };
                prop_assert_eq!(settled, index == 0);
            }

            prop_assert_eq!(calls.get(), 1);
            match ops[0] {
                0 => prop_assert_eq!(c.value(), Some(0)),
                1 => prop_assert_eq!(c.error(), Some("e0".to_string())),
                _ => prop_assert!(c.is_canceled()),
            }
        }
    }
}
