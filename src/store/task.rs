use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct GroupState {
    outstanding: Mutex<usize>,
    done: Condvar,
}

/// Outstanding work started by one `send`: queued actions plus running effects.
///
/// Actions fed back by an effect, and the effects those actions start, join
/// the group of the effect that produced them.
#[derive(Clone)]
pub(crate) struct TaskGroup {
    state: Arc<GroupState>,
}

impl TaskGroup {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(GroupState {
                outstanding: Mutex::new(0),
                done: Condvar::new(),
            }),
        }
    }

    pub(crate) fn enter(&self) {
        *self.state.outstanding.lock() += 1;
    }

    pub(crate) fn leave(&self) {
        let mut outstanding = self.state.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.state.done.notify_all();
        }
    }

    fn is_done(&self) -> bool {
        *self.state.outstanding.lock() == 0
    }

    fn wait(&self) {
        let mut outstanding = self.state.outstanding.lock();
        while *outstanding > 0 {
            self.state.done.wait(&mut outstanding);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut outstanding = self.state.outstanding.lock();
        while *outstanding > 0 {
            if self
                .state
                .done
                .wait_until(&mut outstanding, deadline)
                .timed_out()
            {
                return *outstanding == 0;
            }
        }
        true
    }
}

/// Completion handle returned by [`Store::send`](crate::Store::send).
///
/// The task finishes once the action, every action its effects fed back,
/// and every effect those actions started have finished or been cancelled.
/// Waiting on a task from inside one of its own effects never returns.
#[must_use = "a Task does nothing unless waited on; dropping it does not cancel anything"]
pub struct Task {
    group: TaskGroup,
}

impl Task {
    pub(crate) fn new(group: TaskGroup) -> Self {
        Self { group }
    }

    /// A task with nothing to wait for.
    pub fn finished() -> Self {
        Self::new(TaskGroup::new())
    }

    pub fn is_finished(&self) -> bool {
        self.group.is_done()
    }

    /// Block until the task finishes.
    pub fn wait(&self) {
        self.group.wait();
    }

    /// Block for at most `timeout`. Returns whether the task finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.group.wait_until(Instant::now() + timeout)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("finished", &self.is_finished())
            .finish()
    }
}
