// Cooperative background tasks on top of the callback queue
//
// A task is a loop body that is re-posted after every step while it is
// Running. Sleeping parks it on its own one-shot timer; Suspended parks it
// indefinitely. No stacks, no preemption: a step runs to completion like
// any other deferred callback.
//
// Suspended --resume--> Running --sleep--> Sleeping --timer--> Running
//     ^                    |                   |
//     +------suspend-------+------suspend------+

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;
use log::{debug, warn};

use super::callback::{Callback, Deferred};
use super::scheduler::Scheduler;
use super::timer::{Tick, TimerError, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Suspended,
    Sleeping,
    Running,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Suspended => write!(f, "Suspended"),
            TaskState::Sleeping => write!(f, "Sleeping"),
            TaskState::Running => write!(f, "Running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    None,
    /// Delivered by `suspend()` before the task stops.
    Suspending,
    /// Delivered at the start of the first step after leaving Suspended.
    Resumed,
}

/// Body of a task.
pub trait TaskLoop: Sync + 'static {
    fn step(&self, task: &'static Task<Self>)
    where
        Self: Sized;

    fn notify(&self, _notification: Notification) {}
}

// Deferred entry words
const STEP: usize = 0;
const WAKE: usize = 1;

#[derive(Clone, Copy)]
struct Control {
    state: TaskState,
    pending: Notification,
    // a STEP is sitting in the callback queue
    scheduled: bool,
    // the timer callback points at this task
    timer_bound: bool,
}

pub struct Task<L> {
    scheduler: &'static Scheduler,
    body: L,
    control: Mutex<Cell<Control>>,
    timer: TimerId,
}

impl<L: TaskLoop> Task<L> {
    /// Claims one timer slot for sleeping. The task starts Suspended.
    pub fn new(scheduler: &'static Scheduler, body: L) -> Result<Self, TimerError> {
        let timer = scheduler.create_timer()?;
        Ok(Self {
            scheduler,
            body,
            control: Mutex::new(Cell::new(Control {
                state: TaskState::Suspended,
                pending: Notification::None,
                scheduled: false,
                timer_bound: false,
            })),
            timer,
        })
    }

    pub fn scheduler(&self) -> &'static Scheduler {
        self.scheduler
    }

    pub fn body(&self) -> &L {
        &self.body
    }

    pub fn state(&self) -> TaskState {
        critical_section::with(|cs| self.control.borrow(cs).get().state)
    }

    pub fn timer(&self) -> TimerId {
        self.timer
    }

    /// Start or continue running. Cancels a pending sleep.
    pub fn resume(&'static self) {
        let prev = self.update(|c| {
            let prev = c.state;
            if prev == TaskState::Suspended {
                c.pending = Notification::Resumed;
            }
            c.state = TaskState::Running;
            prev
        });

        match prev {
            TaskState::Running => return,
            TaskState::Sleeping => {
                self.scheduler.disarm(self.timer);
            }
            TaskState::Suspended => {}
        }
        debug!("task {}: {} -> Running", self.timer, prev);
        self.schedule();
    }

    /// Stop running until the next `resume`. The body sees `Suspending`
    /// before the state changes.
    pub fn suspend(&'static self) {
        if self.state() == TaskState::Suspended {
            return;
        }
        self.body.notify(Notification::Suspending);

        let prev = self.update(|c| {
            let prev = c.state;
            c.state = TaskState::Suspended;
            c.pending = Notification::None;
            prev
        });
        if prev == TaskState::Sleeping {
            self.scheduler.disarm(self.timer);
        }
        debug!("task {}: {} -> Suspended", self.timer, prev);
    }

    /// Park for `ticks`, then resume running.
    pub fn sleep(&'static self, ticks: Tick) -> Result<(), TimerError> {
        self.sleep_for(ticks as u64)
    }

    pub fn sleep_ms(&'static self, ms: u32) -> Result<(), TimerError> {
        self.sleep_for(self.scheduler.clock().ms_to_ticks(ms))
    }

    fn sleep_for(&'static self, ticks: u64) -> Result<(), TimerError> {
        let bound = self.update(|c| core::mem::replace(&mut c.timer_bound, true));
        if !bound {
            if let Err(e) = self
                .scheduler
                .set_callback(self.timer, Callback::Object(self, WAKE))
            {
                self.update(|c| c.timer_bound = false);
                return Err(e);
            }
        }

        let prev = self.update(|c| core::mem::replace(&mut c.state, TaskState::Sleeping));
        if let Err(e) = self.scheduler.arm_long(self.timer, ticks, false) {
            self.update(|c| c.state = prev);
            return Err(e);
        }
        debug!("task {}: {} -> Sleeping ({} ticks)", self.timer, prev, ticks);
        Ok(())
    }

    fn schedule(&'static self) {
        let already = self.update(|c| core::mem::replace(&mut c.scheduled, true));
        if already {
            return;
        }
        if !self.scheduler.queue_deferred(self, STEP) {
            self.update(|c| c.scheduled = false);
            warn!("task {}: callback queue full, step not scheduled", self.timer);
        }
    }

    fn run_step(&'static self) {
        let (state, pending) = self.update(|c| {
            c.scheduled = false;
            let pending = core::mem::replace(&mut c.pending, Notification::None);
            (c.state, pending)
        });
        // suspended or put to sleep after this step was queued
        if state != TaskState::Running {
            return;
        }

        if pending != Notification::None {
            self.body.notify(pending);
        }
        self.body.step(self);

        if self.state() == TaskState::Running {
            self.schedule();
        }
    }

    fn wake(&'static self) {
        // resumed, suspended or re-armed since this firing was posted
        if self.state() != TaskState::Sleeping || self.scheduler.is_armed(self.timer) {
            return;
        }
        let woke = self.update(|c| {
            if c.state == TaskState::Sleeping {
                c.state = TaskState::Running;
                true
            } else {
                false
            }
        });
        if woke {
            debug!("task {}: Sleeping -> Running", self.timer);
            self.schedule();
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut Control) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.control.borrow(cs);
            let mut c = cell.get();
            let r = f(&mut c);
            cell.set(c);
            r
        })
    }
}

impl<L: TaskLoop> Deferred for Task<L> {
    fn run(&'static self, param: usize) {
        match param {
            STEP => self.run_step(),
            WAKE => self.wake(),
            _ => warn!("task {}: unknown entry {}", self.timer, param),
        }
    }
}

impl<L> Drop for Task<L> {
    fn drop(&mut self) {
        self.scheduler.release_timer(self.timer);
    }
}
