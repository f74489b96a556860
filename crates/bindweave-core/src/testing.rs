#![forbid(unsafe_code)]

//! Helpers for driving a [`Scheduler`] deterministically in tests.

use std::rc::Rc;
use std::time::Duration;

use crate::clock::ManualClock;
use crate::scheduler::Scheduler;

/// A scheduler wired to a fresh [`ManualClock`].
#[must_use]
pub fn manual_scheduler() -> (ManualClock, Scheduler) {
    let clock = ManualClock::new();
    let scheduler = Scheduler::with_clock(Rc::new(clock.clone()));
    (clock, scheduler)
}

/// Advance `clock` by `by`, then drain every task that became ready.
///
/// Returns the number of tasks run.
pub fn advance_and_run(clock: &ManualClock, scheduler: &Scheduler, by: Duration) -> usize {
    clock.advance(by);
    scheduler.run_until_idle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Priority;
    use std::cell::Cell;

    #[test]
    fn advance_releases_due_timers() {
        let (clock, scheduler) = manual_scheduler();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        scheduler.schedule_after(Duration::from_millis(10), Priority::Idle, "t", move || f.set(true));
        assert_eq!(advance_and_run(&clock, &scheduler, Duration::from_millis(5)), 0);
        assert_eq!(advance_and_run(&clock, &scheduler, Duration::from_millis(5)), 1);
        assert!(fired.get());
    }
}
