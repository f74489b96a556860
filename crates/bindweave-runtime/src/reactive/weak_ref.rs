#![forbid(unsafe_code)]

//! Id-keyed element references that do not keep detached elements alive
//! forever.
//!
//! Bindings never hold their destination element directly. They hold an id
//! string and ask a [`WeakRefTable`] for the element each time they fire.
//!
//! # Modes
//!
//! - [`WeakRefMode::Table`]: each id maps to a strong handle plus the time of
//!   its last access. A sweep task purges entries idle longer than
//!   `entry_timeout`, then reschedules itself while the table is non-empty.
//! - [`WeakRefMode::Native`]: each id maps to a [`WeakElement`]; lookups
//!   upgrade it. No timestamps and no sweeping.
//!
//! # Lookup in table mode
//!
//! 1. Inside a [`bulk_pass`](WeakRefTable::bulk_pass) with `fast_load`
//!    enabled, a cached entry is trusted as is.
//! 2. Otherwise a live lookup by id runs first. If the element is attached,
//!    the cache entry is evicted (the document holds it) and the element is
//!    returned.
//! 3. Failing that, a cache hit refreshes the entry's timestamp.
//! 4. Otherwise the reference is gone.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use bindweave_core::{Priority, Scheduler, TaskHandle};

use crate::config::{SweepTrigger, WeakRefConfig, WeakRefMode};
use crate::dom::{Document, ElementRef, ID_ATTRIBUTE, WeakElement};

/// Prefix of ids allocated for elements that have none.
pub const GENERATED_ID_PREFIX: &str = "_bw_ref";

static REF_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_generated_id() -> String {
    format!(
        "{GENERATED_ID_PREFIX}{}",
        REF_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// The id under which `element` can be looked up, allocating one if needed.
///
/// An existing non-empty `id` attribute is reused. Otherwise a fresh
/// process-unique id is written to the element.
pub fn element_id(element: &ElementRef) -> String {
    if let Some(id) = element.id() {
        return id;
    }
    let id = next_generated_id();
    element.set_attribute(ID_ATTRIBUTE, id.clone());
    id
}

enum Slot {
    Strong {
        element: ElementRef,
        last_access: Duration,
    },
    Weak(WeakElement),
}

struct TableInner {
    document: Document,
    scheduler: Scheduler,
    config: WeakRefConfig,
    entries: RefCell<AHashMap<String, Slot>>,
    sweep: RefCell<Option<TaskHandle>>,
    bulk_depth: Cell<usize>,
}

impl TableInner {
    fn schedule_sweep(self: &Rc<Self>) {
        if self.config.mode == WeakRefMode::Native {
            return;
        }
        if self
            .sweep
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_canceled())
        {
            return;
        }
        let priority = match self.config.trigger {
            SweepTrigger::Timer => Priority::Normal,
            SweepTrigger::Idle => Priority::Idle,
        };
        let weak: Weak<Self> = Rc::downgrade(self);
        let handle = self.scheduler.schedule_after(
            self.config.sweep_period,
            priority,
            "weak_ref:sweep",
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep.borrow_mut().take();
                    inner.sweep_now();
                }
            },
        );
        *self.sweep.borrow_mut() = Some(handle);
    }

    fn sweep_now(self: &Rc<Self>) -> usize {
        let now = self.scheduler.now();
        let timeout = self.config.entry_timeout;
        let (purged, remaining) = {
            let mut entries = self.entries.borrow_mut();
            let before = entries.len();
            entries.retain(|_, slot| match slot {
                Slot::Strong { last_access, .. } => now.saturating_sub(*last_access) <= timeout,
                Slot::Weak(weak) => weak.upgrade().is_some(),
            });
            (before - entries.len(), entries.len())
        };
        tracing::debug!(
            target: "bindweave::weak_ref",
            purged,
            remaining,
            "swept weak reference table"
        );
        if remaining > 0 {
            self.schedule_sweep();
        }
        purged
    }
}

impl Drop for TableInner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.get_mut().take() {
            handle.cancel();
        }
    }
}

/// Id-keyed table of element references.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct WeakRefTable {
    inner: Rc<TableInner>,
}

impl fmt::Debug for WeakRefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRefTable")
            .field("mode", &self.inner.config.mode)
            .field("entries", &self.inner.entries.borrow().len())
            .field("sweep_scheduled", &self.inner.sweep.borrow().is_some())
            .finish()
    }
}

impl WeakRefTable {
    #[must_use]
    pub fn new(document: &Document, scheduler: &Scheduler, config: WeakRefConfig) -> Self {
        Self {
            inner: Rc::new(TableInner {
                document: document.clone(),
                scheduler: scheduler.clone(),
                config,
                entries: RefCell::new(AHashMap::new()),
                sweep: RefCell::new(None),
                bulk_depth: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &WeakRefConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn mode(&self) -> WeakRefMode {
        self.inner.config.mode
    }

    /// Register `element` and return the id it can be looked up by.
    ///
    /// `id` takes precedence over the element's own id attribute; if the
    /// element has none, `id` is written to it.
    pub fn create_ref(&self, element: &ElementRef, id: Option<&str>) -> String {
        let id = match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                if element.id().is_none() {
                    element.set_attribute(ID_ATTRIBUTE, id);
                }
                id.to_owned()
            }
            None => element_id(element),
        };
        let slot = match self.inner.config.mode {
            WeakRefMode::Native => Slot::Weak(element.downgrade()),
            WeakRefMode::Table => Slot::Strong {
                element: element.clone(),
                last_access: self.inner.scheduler.now(),
            },
        };
        self.inner.entries.borrow_mut().insert(id.clone(), slot);
        tracing::trace!(target: "bindweave::weak_ref", id = %id, "reference created");
        self.inner.schedule_sweep();
        id
    }

    /// Resolve `id` to an element. Never fails; a gone reference is `None`.
    #[must_use]
    pub fn get_ref_element(&self, id: &str) -> Option<ElementRef> {
        if self.inner.config.mode == WeakRefMode::Native {
            return self.upgrade_native(id);
        }

        if self.is_fast_path() {
            if let Some(element) = self.cached(id) {
                return Some(element);
            }
            return self.inner.document.element_by_id(id);
        }

        if let Some(element) = self.inner.document.element_by_id(id) {
            self.inner.entries.borrow_mut().remove(id);
            return Some(element);
        }

        let now = self.inner.scheduler.now();
        let mut entries = self.inner.entries.borrow_mut();
        match entries.get_mut(id) {
            Some(Slot::Strong {
                element,
                last_access,
            }) => {
                *last_access = now;
                Some(element.clone())
            }
            _ => None,
        }
    }

    fn upgrade_native(&self, id: &str) -> Option<ElementRef> {
        let upgraded = match self.inner.entries.borrow().get(id) {
            Some(Slot::Weak(weak)) => weak.upgrade(),
            Some(Slot::Strong { element, .. }) => Some(element.clone()),
            None => return self.inner.document.element_by_id(id),
        };
        if upgraded.is_none() {
            self.inner.entries.borrow_mut().remove(id);
        }
        upgraded
    }

    fn cached(&self, id: &str) -> Option<ElementRef> {
        match self.inner.entries.borrow().get(id) {
            Some(Slot::Strong { element, .. }) => Some(element.clone()),
            Some(Slot::Weak(weak)) => weak.upgrade(),
            None => None,
        }
    }

    fn is_fast_path(&self) -> bool {
        self.inner.config.fast_load && self.inner.bulk_depth.get() > 0
    }

    /// Purge entries idle longer than the configured timeout.
    ///
    /// Returns the number of entries removed. Reschedules itself while the
    /// table is non-empty.
    pub fn sweep(&self) -> usize {
        self.inner.sweep_now()
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn invalidate(&self, id: &str) -> bool {
        self.inner.entries.borrow_mut().remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.entries.borrow().contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Whether a sweep task is currently scheduled.
    #[must_use]
    pub fn sweep_scheduled(&self) -> bool {
        self.inner
            .sweep
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_canceled())
    }

    /// Mark a bulk binding pass. While any guard is alive and `fast_load`
    /// is enabled, lookups trust cached entries.
    #[must_use = "the pass ends when the guard is dropped"]
    pub fn bulk_pass(&self) -> BulkPass {
        self.inner.bulk_depth.set(self.inner.bulk_depth.get() + 1);
        BulkPass {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Whether a bulk pass is in progress.
    #[must_use]
    pub fn in_bulk_pass(&self) -> bool {
        self.inner.bulk_depth.get() > 0
    }
}

/// Guard returned by [`WeakRefTable::bulk_pass`].
pub struct BulkPass {
    inner: Rc<TableInner>,
}

impl Drop for BulkPass {
    fn drop(&mut self) {
        let depth = self.inner.bulk_depth.get();
        debug_assert!(depth > 0);
        self.inner.bulk_depth.set(depth.saturating_sub(1));
    }
}

impl fmt::Debug for BulkPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkPass")
            .field("depth", &self.inner.bulk_depth.get())
            .finish()
    }
}
