#![forbid(unsafe_code)]

//! Cooperative, priority-queued task scheduler.
//!
//! All asynchronous work in bindweave (change notification dispatch, binding
//! setup, weak reference sweeps) is submitted here as a closure. Nothing runs
//! until the host pumps the scheduler with [`Scheduler::run_one`] or
//! [`Scheduler::run_until_idle`]; there is no parallelism.
//!
//! # Ordering
//!
//! - Within one [`Priority`], tasks run in submission order.
//! - Across priorities, every ready `High` task runs before any `Normal` task,
//!   and `Normal` before `Idle`. A task submitted at a higher priority while
//!   lower-priority work is queued therefore overtakes it.
//! - Delayed tasks become ready once the scheduler's [`Clock`] reaches their
//!   due time; ties keep submission order.
//!
//! # Cancellation
//!
//! Each task carries a [`CancelToken`]. A canceled task is discarded when it
//! reaches the front of its queue and never runs. Tasks that want to stop
//! partway through check their token at their own resumption points.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Task priority. Higher priorities drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Latency-sensitive work.
    High,
    /// The default.
    Normal,
    /// Housekeeping that should only run when nothing else is queued.
    Idle,
}

impl Priority {
    const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Idle];

    fn slot(self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Idle => 2,
        }
    }
}

/// Shared cooperative cancellation flag.
#[derive(Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    /// Create an un-canceled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.set(true);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.get()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelToken").field(&self.0.get()).finish()
    }
}

/// Identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw id value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Handle to a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    token: CancelToken,
}

impl TaskHandle {
    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Cancel the task. A task that already ran is unaffected.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }
}

struct Task {
    id: TaskId,
    priority: Priority,
    tag: String,
    token: CancelToken,
    run: Box<dyn FnOnce()>,
}

struct Timer {
    due: Duration,
    task: Task,
}

#[derive(Default)]
struct SchedulerInner {
    queues: [VecDeque<Task>; 3],
    timers: Vec<Timer>,
    next_id: u64,
}

impl SchedulerInner {
    fn allocate(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    fn promote_due(&mut self, now: Duration) {
        if self.timers.is_empty() {
            return;
        }
        // Stable sort keeps submission order among equal due times.
        self.timers.sort_by_key(|timer| timer.due);
        let ready = self.timers.partition_point(|timer| timer.due <= now);
        for timer in self.timers.drain(..ready) {
            self.queues[timer.task.priority.slot()].push_back(timer.task);
        }
    }

    fn pop_ready(&mut self) -> Option<Task> {
        for priority in Priority::ALL {
            let queue = &mut self.queues[priority.slot()];
            while let Some(task) = queue.pop_front() {
                if task.token.is_canceled() {
                    tracing::trace!(
                        target: "bindweave::scheduler",
                        task = task.id.0,
                        tag = %task.tag,
                        "dropping canceled task"
                    );
                    continue;
                }
                return Some(task);
            }
        }
        None
    }
}

/// Single-threaded cooperative scheduler.
///
/// Clones share the same queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: Rc<dyn Clock>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("high", &inner.queues[0].len())
            .field("normal", &inner.queues[1].len())
            .field("idle", &inner.queues[2].len())
            .field("timers", &inner.timers.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler driven by a [`SystemClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock::new()))
    }

    /// Create a scheduler driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner::default())),
            clock,
        }
    }

    /// The clock that drives delayed tasks.
    #[must_use]
    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    /// Current time according to the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Submit `run` for execution at `priority`.
    ///
    /// `tag` is a short label used in trace output.
    pub fn schedule(
        &self,
        priority: Priority,
        tag: impl Into<String>,
        run: impl FnOnce() + 'static,
    ) -> TaskHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.allocate();
        let token = CancelToken::new();
        let task = Task {
            id,
            priority,
            tag: tag.into(),
            token: token.clone(),
            run: Box::new(run),
        };
        tracing::trace!(target: "bindweave::scheduler", task = id.0, tag = %task.tag, ?priority, "scheduled");
        inner.queues[priority.slot()].push_back(task);
        TaskHandle { id, token }
    }

    /// Submit `run` to become ready once `delay` has elapsed.
    pub fn schedule_after(
        &self,
        delay: Duration,
        priority: Priority,
        tag: impl Into<String>,
        run: impl FnOnce() + 'static,
    ) -> TaskHandle {
        let due = self.clock.now() + delay;
        let mut inner = self.inner.borrow_mut();
        let id = inner.allocate();
        let token = CancelToken::new();
        let task = Task {
            id,
            priority,
            tag: tag.into(),
            token: token.clone(),
            run: Box::new(run),
        };
        tracing::trace!(target: "bindweave::scheduler", task = id.0, tag = %task.tag, ?delay, "timer armed");
        inner.timers.push(Timer { due, task });
        TaskHandle { id, token }
    }

    /// Run the highest-priority ready task. Returns `false` if none was ready.
    pub fn run_one(&self) -> bool {
        let now = self.clock.now();
        let task = {
            let mut inner = self.inner.borrow_mut();
            inner.promote_due(now);
            inner.pop_ready()
        };
        match task {
            Some(task) => {
                tracing::trace!(target: "bindweave::scheduler", task = task.id.0, tag = %task.tag, "running");
                (task.run)();
                true
            }
            None => false,
        }
    }

    /// Run ready tasks until none remain. Returns the number of tasks run.
    ///
    /// Timers that are not yet due stay queued.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks (ready or delayed) that are not canceled.
    #[must_use]
    pub fn pending(&self) -> usize {
        let inner = self.inner.borrow();
        let queued = inner
            .queues
            .iter()
            .flatten()
            .filter(|task| !task.token.is_canceled())
            .count();
        let delayed = inner
            .timers
            .iter()
            .filter(|timer| !timer.task.token.is_canceled())
            .count();
        queued + delayed
    }

    /// Due time of the earliest live delayed task.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.inner
            .borrow()
            .timers
            .iter()
            .filter(|timer| !timer.task.token.is_canceled())
            .map(|timer| timer.due)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn manual() -> (ManualClock, Scheduler) {
        let clock = ManualClock::new();
        let scheduler = Scheduler::with_clock(Rc::new(clock.clone()));
        (clock, scheduler)
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let push = move |name: &'static str| -> Box<dyn FnOnce()> {
            let l = Rc::clone(&l);
            Box::new(move || l.borrow_mut().push(name))
        };
        (log, push)
    }

    #[test]
    fn nothing_runs_until_pumped() {
        let (_, scheduler) = manual();
        let (log, push) = recorder();
        scheduler.schedule(Priority::Normal, "a", push("a"));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn higher_priority_overtakes() {
        let (_, scheduler) = manual();
        let (log, push) = recorder();
        scheduler.schedule(Priority::Idle, "idle", push("idle"));
        scheduler.schedule(Priority::Normal, "n1", push("n1"));
        scheduler.schedule(Priority::High, "high", push("high"));
        scheduler.schedule(Priority::Normal, "n2", push("n2"));
        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["high", "n1", "n2", "idle"]);
    }

    #[test]
    fn canceled_task_never_runs() {
        let (_, scheduler) = manual();
        let (log, push) = recorder();
        let handle = scheduler.schedule(Priority::Normal, "a", push("a"));
        scheduler.schedule(Priority::Normal, "b", push("b"));
        handle.cancel();
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn delayed_task_waits_for_clock() {
        let (clock, scheduler) = manual();
        let (log, push) = recorder();
        scheduler.schedule_after(Duration::from_millis(500), Priority::Idle, "sweep", push("sweep"));
        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(scheduler.next_due(), Some(Duration::from_millis(500)));

        clock.advance(Duration::from_millis(499));
        assert_eq!(scheduler.run_until_idle(), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["sweep"]);
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn tasks_may_schedule_more_work() {
        let (_, scheduler) = manual();
        let count = Rc::new(Cell::new(0));
        let s = scheduler.clone();
        let c = Rc::clone(&count);
        scheduler.schedule(Priority::Normal, "outer", move || {
            c.set(c.get() + 1);
            let c2 = Rc::clone(&c);
            s.schedule(Priority::Normal, "inner", move || c2.set(c2.get() + 1));
        });
        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(count.get(), 2);
    }

    fn priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::High),
            Just(Priority::Normal),
            Just(Priority::Idle)
        ]
    }

    proptest! {
        #[test]
        fn drains_by_priority_then_submission_order(
            plan in proptest::collection::vec((priority(), any::<bool>()), 0..40),
        ) {
            let (_, scheduler) = manual();
            let log = Rc::new(RefCell::new(Vec::new()));
            let mut expected = Vec::new();
            for (index, &(priority, cancel)) in plan.iter().enumerate() {
                let l = Rc::clone(&log);
                let handle = scheduler.schedule(priority, "task", move || l.borrow_mut().push(index));
                if cancel {
                    handle.cancel();
                } else {
                    expected.push((priority, index));
                }
            }
            expected.sort_by_key(|&(priority, _)| priority);
            let expected: Vec<usize> = expected.into_iter().map(|(_, index)| index).collect();

            prop_assert_eq!(scheduler.run_until_idle(), expected.len());
            prop_assert_eq!(&*log.borrow(), &expected);
        }
    }
}
