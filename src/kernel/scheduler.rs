// Priority task queues, deferred callbacks and the software timer list
//
// One Scheduler owns every queue and timer for the process. Producers
// (including ISRs) hold a shared reference and only ever touch state
// inside a short critical section: one ring insert, one pop, one list
// link or unlink. User code always runs with interrupts enabled and no
// borrow held, so consumers may post, arm and disarm freely.
//
// Each priority level has its own consumer, fixed at build time.
// CALLBACK_PRIORITY always runs the built-in callback dispatcher; that is
// where timer expiries and queue_callback() work land.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use log::{debug, error, info, trace, warn};
use static_cell::StaticCell;

use super::callback::{Callback, Deferred, Event, InterruptCallback, TaskCallback, dispatch_callback};
use super::clock::Clock;
use super::config::{CALLBACK_PRIORITY, MAX_FIRES_PER_PASS, MAX_TIMERS, QUEUE_LEN};
use super::queue::{Overflow, Priority, QueueStats, TaskQueue};
use super::timer::{Armed, Service, Tick, TimerError, TimerId, TimerList};
use super::wake::WakeFlags;

/// Per-priority event handler.
pub type Consumer = fn(Event);

#[derive(Debug)]
pub enum PostError {
    /// Queue for this priority level is full, contains the rejected event
    Full(Event),
    /// No consumer was registered for this priority at build time
    Unconfigured(Priority),
    /// The closure could not be boxed
    NoMemory,
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostError::Full(event) => write!(f, "queue full, rejected {:?}", event),
            PostError::Unconfigured(p) => write!(f, "no consumer for priority {}", p),
            PostError::NoMemory => write!(f, "out of memory for deferred closure"),
        }
    }
}

struct Level {
    queue: Mutex<RefCell<TaskQueue<Event, QUEUE_LEN>>>,
    consumer: Option<Consumer>,
    overflow: Overflow,
}

pub struct SchedulerBuilder {
    clock: &'static dyn Clock,
    consumers: [Option<Consumer>; Priority::COUNT],
    overflow: [Overflow; Priority::COUNT],
}

impl SchedulerBuilder {
    /// Register the consumer for a priority level.
    ///
    /// # Panics
    /// If `priority` is `CALLBACK_PRIORITY`, which is reserved.
    pub fn consumer(mut self, priority: Priority, consumer: Consumer) -> Self {
        assert!(
            priority != CALLBACK_PRIORITY,
            "priority {} is reserved for deferred callbacks",
            priority
        );
        self.consumers[priority.index()] = Some(consumer);
        self
    }

    /// # Panics
    /// If `DropOldest` is requested for `CALLBACK_PRIORITY`: an accepted
    /// callback must always run.
    pub fn overflow(mut self, priority: Priority, overflow: Overflow) -> Self {
        assert!(
            !(priority == CALLBACK_PRIORITY && overflow == Overflow::DropOldest),
            "callback priority cannot evict accepted callbacks"
        );
        self.overflow[priority.index()] = overflow;
        self
    }

    pub fn build(self) -> Scheduler {
        let mut consumers = self.consumers;
        consumers[CALLBACK_PRIORITY.index()] = Some(dispatch_callback);

        let levels = core::array::from_fn(|i| Level {
            queue: Mutex::new(RefCell::new(TaskQueue::new())),
            consumer: consumers[i],
            overflow: self.overflow[i],
        });

        let configured = consumers.iter().filter(|c| c.is_some()).count();
        info!(
            "scheduler: {} of {} priorities configured, {} slots each, {} timers",
            configured,
            Priority::COUNT,
            QUEUE_LEN,
            MAX_TIMERS
        );

        Scheduler {
            levels,
            timers: Mutex::new(RefCell::new(TimerList::new())),
            clock: self.clock,
            wake: WakeFlags::new(),
        }
    }
}

static SCHEDULER: StaticCell<Scheduler> = StaticCell::new();

/// Build the process-wide scheduler.
///
/// # Panics
/// If called more than once.
pub fn init(builder: SchedulerBuilder) -> &'static Scheduler {
    SCHEDULER.init(builder.build())
}

pub struct Scheduler {
    levels: [Level; Priority::COUNT],
    timers: Mutex<RefCell<TimerList<MAX_TIMERS>>>,
    clock: &'static dyn Clock,
    wake: WakeFlags,
}

impl Scheduler {
    pub fn builder(clock: &'static dyn Clock) -> SchedulerBuilder {
        SchedulerBuilder {
            clock,
            consumers: [None; Priority::COUNT],
            overflow: [Overflow::DropNewest; Priority::COUNT],
        }
    }

    /// Scheduler with only the callback priority configured.
    pub fn new(clock: &'static dyn Clock) -> Self {
        Self::builder(clock).build()
    }

    pub fn clock(&self) -> &'static dyn Clock {
        self.clock
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn wake(&self) -> &WakeFlags {
        &self.wake
    }

    pub fn is_configured(&self, priority: Priority) -> bool {
        self.levels[priority.index()].consumer.is_some()
    }

    // ── Priority task queue ─────────────────────────────────────────

    /// Queue an event. Bounded and non-blocking; safe from an ISR as long
    /// as the event is not a closure being evicted by `DropOldest`.
    pub fn try_post(&self, priority: Priority, event: Event) -> Result<(), PostError> {
        let level = &self.levels[priority.index()];
        if level.consumer.is_none() {
            error!("post to unconfigured priority {}", priority);
            return Err(PostError::Unconfigured(priority));
        }

        let result =
            critical_section::with(|cs| level.queue.borrow_ref_mut(cs).push_with(event, level.overflow));

        match result {
            Ok(evicted) => {
                self.wake.signal_posted();
                if let Some(old) = evicted {
                    warn!("{} queue full, evicted {:?}", priority, old);
                }
                Ok(())
            }
            Err(event) => Err(PostError::Full(event)),
        }
    }

    /// Queue a raw (signal, param) pair, dropping it if the queue is full.
    pub fn post(&self, priority: Priority, signal: u32, param: usize) -> bool {
        self.try_post(priority, Event::signal(signal, param)).is_ok()
    }

    /// Run exactly the events queued at entry. Anything posted while
    /// draining waits for the next sweep.
    pub fn drain(&self, priority: Priority) -> usize {
        let level = &self.levels[priority.index()];
        let Some(consumer) = level.consumer else {
            return 0;
        };

        let n = critical_section::with(|cs| level.queue.borrow_ref(cs).len());
        let mut serviced = 0;
        for _ in 0..n {
            let Some(event) = critical_section::with(|cs| level.queue.borrow_ref_mut(cs).pop())
            else {
                break;
            };
            consumer(event);
            serviced += 1;
        }
        serviced
    }

    /// One full sweep, most urgent priority first.
    pub fn dispatch(&self) -> usize {
        let mut total = 0;
        for priority in Priority::SWEEP {
            let n = self.drain(priority);
            if n > 0 {
                trace!("dispatch: {} x{}", priority, n);
            }
            total += n;
        }
        total
    }

    pub fn queue_stats(&self, priority: Priority) -> QueueStats {
        let level = &self.levels[priority.index()];
        critical_section::with(|cs| level.queue.borrow_ref(cs).stats())
    }

    /// Events waiting at every priority.
    pub fn pending(&self) -> usize {
        Priority::SWEEP
            .iter()
            .map(|p| self.queue_stats(*p).pending)
            .sum()
    }

    /// Callbacks currently waiting on the callback queue.
    pub fn task_count(&self) -> usize {
        self.queue_stats(CALLBACK_PRIORITY).pending
    }

    /// Most callbacks ever waiting at once. Reaching `QUEUE_LEN` means
    /// some were probably rejected.
    pub fn max_task_count(&self) -> usize {
        self.queue_stats(CALLBACK_PRIORITY).high_water
    }

    // ── Deferred callbacks ──────────────────────────────────────────

    pub fn try_queue(&self, callback: Callback) -> Result<(), PostError> {
        self.try_post(CALLBACK_PRIORITY, Event::Callback(callback))
    }

    /// ISR-safe: no allocation.
    pub fn queue_callback(&self, func: TaskCallback, param: usize) -> bool {
        self.try_queue(Callback::Call(func, param)).is_ok()
    }

    /// ISR-safe: no allocation.
    pub fn queue_interrupt_callback(&self, func: InterruptCallback) -> bool {
        self.try_queue(Callback::Interrupt(func)).is_ok()
    }

    /// ISR-safe: no allocation.
    pub fn queue_deferred(&self, obj: &'static dyn Deferred, param: usize) -> bool {
        self.try_queue(Callback::Object(obj, param)).is_ok()
    }

    /// Box and queue a closure. Task context only.
    ///
    /// On error the closure has been dropped without running.
    pub fn try_queue_closure<F>(&self, f: F) -> Result<(), PostError>
    where
        F: FnOnce() + Send + 'static,
    {
        let event = Event::closure(f).ok_or(PostError::NoMemory)?;
        self.try_post(CALLBACK_PRIORITY, event)
    }

    pub fn queue_closure<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.try_queue_closure(f) {
            Ok(()) => true,
            Err(e) => {
                warn!("queue_closure: {}", e);
                false
            }
        }
    }

    // ── Software timers ─────────────────────────────────────────────

    pub fn create_timer(&self) -> Result<TimerId, TimerError> {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).create())
    }

    pub fn release_timer(&self, id: TimerId) {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).release(id));
    }

    pub fn set_callback(&self, id: TimerId, callback: Callback) -> Result<(), TimerError> {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).set_callback(id, callback))
    }

    /// Arm for `interval` ticks from now, restarting it if already armed.
    pub fn arm(&self, id: TimerId, interval: Tick, repeating: bool) -> Result<(), TimerError> {
        let armed = critical_section::with(|cs| {
            let now = self.clock.now();
            self.timers.borrow_ref_mut(cs).arm(id, now, interval, repeating)
        });
        self.armed(id, armed)
    }

    /// Arm with a 64-bit interval; see `TimerList::arm_long`.
    pub fn arm_long(&self, id: TimerId, interval: u64, repeating: bool) -> Result<(), TimerError> {
        let armed = critical_section::with(|cs| {
            let now = self.clock.now();
            self.timers.borrow_ref_mut(cs).arm_long(id, now, interval, repeating)
        });
        self.armed(id, armed)
    }

    /// Always safe, including from the timer's own callback. Returns
    /// false if the timer was not armed.
    pub fn disarm(&self, id: TimerId) -> bool {
        critical_section::with(|cs| self.timers.borrow_ref_mut(cs).disarm(id))
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        critical_section::with(|cs| self.timers.borrow_ref(cs).is_armed(id))
    }

    pub fn remaining(&self, id: TimerId) -> Option<u64> {
        critical_section::with(|cs| {
            let now = self.clock.now();
            self.timers.borrow_ref(cs).remaining(id, now)
        })
    }

    pub fn interval(&self, id: TimerId) -> Option<u64> {
        critical_section::with(|cs| self.timers.borrow_ref(cs).interval(id))
    }

    pub fn armed_timers(&self) -> usize {
        critical_section::with(|cs| self.timers.borrow_ref(cs).armed_count())
    }

    /// Check the head timer once. A fired timer's callback is posted to
    /// the callback queue, never invoked here.
    pub fn service(&self) -> Service {
        let (service, callback) = critical_section::with(|cs| {
            let mut timers = self.timers.borrow_ref_mut(cs);
            let service = timers.service(self.clock.now());
            let callback = match service {
                Service::Fired(id) => timers.callback(id),
                _ => None,
            };
            (service, callback)
        });

        if let Service::Fired(id) = service {
            match callback {
                Some(cb) => {
                    if let Err(e) = self.try_queue(cb) {
                        self.redeliver(id, e);
                    }
                }
                None => trace!("{} fired with no callback", id),
            }
        }
        service
    }

    // A repeating timer is still armed and simply loses this firing. A
    // one-shot would never fire again, so it is re-queued to retry.
    fn redeliver(&self, id: TimerId, e: PostError) {
        let retried = critical_section::with(|cs| {
            let now = self.clock.now();
            self.timers.borrow_ref_mut(cs).retry(id, now)
        });
        if retried {
            warn!("{} fired but {}; retrying", id, e);
        } else {
            warn!("{} fired but its callback was lost: {}", id, e);
        }
    }

    /// Fire everything that is due. Returns the number fired and the
    /// ticks until the next expiry (`None` if no timer is armed).
    pub fn service_timers(&self) -> (usize, Option<Tick>) {
        let mut fired = 0;
        while fired < MAX_FIRES_PER_PASS {
            match self.service() {
                Service::Fired(_) => fired += 1,
                Service::Pending(ticks) => return (fired, Some(ticks)),
                Service::Idle => return (fired, None),
            }
        }
        // still behind; let the queues run before catching up
        (fired, Some(0))
    }

    /// Disarm every timer and discard every queued event without running it.
    /// Returns the number of events discarded.
    pub fn teardown(&self) -> usize {
        let timers = critical_section::with(|cs| self.timers.borrow_ref_mut(cs).disarm_all());

        let mut discarded = 0;
        for level in &self.levels {
            // pop one at a time so closures are freed outside the critical section
            while let Some(event) = critical_section::with(|cs| level.queue.borrow_ref_mut(cs).pop()) {
                drop(event);
                discarded += 1;
            }
        }
        let _ = self.wake.take();

        info!(
            "scheduler: torn down, {} timers disarmed, {} events discarded",
            timers, discarded
        );
        discarded
    }

    fn armed(&self, id: TimerId, armed: Result<Armed, TimerError>) -> Result<(), TimerError> {
        match armed {
            Ok(armed) => {
                if armed.clamped {
                    warn!("{}: interval clamped to {} ticks", id, armed.interval);
                }
                if armed.head {
                    self.wake.signal_timer();
                    debug!("{} now next due", id);
                }
                Ok(())
            }
            Err(e) => {
                warn!("arm: {}", e);
                Err(e)
            }
        }
    }
}
