// Owned handle over one scheduler timer slot
//
// The slot is claimed on construction and released on drop, so a timer
// can never be left linked into the list after its owner is gone.

use super::callback::{Callback, Deferred, InterruptCallback, TaskCallback};
use super::scheduler::Scheduler;
use super::timer::{Tick, TimerError, TimerId};

pub struct SoftTimer<'a> {
    sched: &'a Scheduler,
    id: TimerId,
}

impl<'a> SoftTimer<'a> {
    pub fn new(sched: &'a Scheduler) -> Result<Self, TimerError> {
        let id = sched.create_timer()?;
        Ok(Self { sched, id })
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Callback posted to the callback queue each time the timer expires.
    pub fn set_callback(&self, func: TaskCallback, arg: usize) -> Result<(), TimerError> {
        self.sched.set_callback(self.id, Callback::Call(func, arg))
    }

    pub fn set_interrupt_callback(&self, func: InterruptCallback) -> Result<(), TimerError> {
        self.sched.set_callback(self.id, Callback::Interrupt(func))
    }

    pub fn set_deferred(&self, obj: &'static dyn Deferred, param: usize) -> Result<(), TimerError> {
        self.sched.set_callback(self.id, Callback::Object(obj, param))
    }

    /// Arm (or re-arm) for `interval` ticks.
    pub fn start(&self, interval: Tick, repeating: bool) -> Result<(), TimerError> {
        self.sched.arm(self.id, interval, repeating)
    }

    pub fn start_once(&self, interval: Tick) -> Result<(), TimerError> {
        self.start(interval, false)
    }

    /// Arm with an interval in milliseconds, converted by the scheduler's clock.
    pub fn arm_ms(&self, ms: u32, repeating: bool) -> Result<(), TimerError> {
        let ticks = self.sched.clock().ms_to_ticks(ms);
        self.sched.arm_long(self.id, ticks, repeating)
    }

    /// Arm with an interval that may not fit the tick range.
    pub fn arm_long(&self, interval: u64, repeating: bool) -> Result<(), TimerError> {
        self.sched.arm_long(self.id, interval, repeating)
    }

    /// Returns false if it was not running.
    pub fn stop(&self) -> bool {
        self.sched.disarm(self.id)
    }

    pub fn is_armed(&self) -> bool {
        self.sched.is_armed(self.id)
    }

    pub fn remaining(&self) -> Option<u64> {
        self.sched.remaining(self.id)
    }

    pub fn interval(&self) -> Option<u64> {
        self.sched.interval(self.id)
    }
}

impl Drop for SoftTimer<'_> {
    fn drop(&mut self) {
        self.sched.release_timer(self.id);
    }
}
