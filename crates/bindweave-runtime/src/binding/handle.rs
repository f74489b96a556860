#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

struct HandleState {
    canceled: Cell<bool>,
    on_cancel: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Cancellation handle for one established binding.
///
/// Clones share state. Canceling runs every registered teardown exactly
/// once; teardowns registered after cancellation run immediately.
#[derive(Clone)]
pub struct BindingHandle {
    state: Rc<HandleState>,
}

impl Default for BindingHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingHandle")
            .field("canceled", &self.state.canceled.get())
            .finish()
    }
}

impl BindingHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(HandleState {
                canceled: Cell::new(false),
                on_cancel: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register teardown work.
    pub fn on_cancel(&self, f: impl FnOnce() + 'static) {
        if self.state.canceled.get() {
            f();
            return;
        }
        self.state.on_cancel.borrow_mut().push(Box::new(f));
    }

    /// Cancel the binding. Idempotent.
    pub fn cancel(&self) {
        if self.state.canceled.replace(true) {
            return;
        }
        let teardown = std::mem::take(&mut *self.state.on_cancel.borrow_mut());
        for f in teardown {
            f();
        }
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.get()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_runs_once() {
        let handle = BindingHandle::new();
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        handle.on_cancel(move || r.set(r.get() + 1));
        handle.cancel();
        handle.clone().cancel();
        assert_eq!(runs.get(), 1);
        assert!(handle.is_canceled());
    }

    #[test]
    fn late_registration_runs_immediately() {
        let handle = BindingHandle::new();
        handle.cancel();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        handle.on_cancel(move || r.set(true));
        assert!(ran.get());
    }

    #[test]
    fn teardown_may_cancel_again() {
        let handle = BindingHandle::new();
        let h = handle.clone();
        handle.on_cancel(move || h.cancel());
        handle.cancel();
        assert!(handle.is_canceled());
    }
}
