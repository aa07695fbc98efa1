// Cooperative scheduling kernel
// Single core, no preemption. Producers (ISRs included) post work into
// bounded priority queues and arm software timers; one dispatch loop runs
// everything to completion with interrupts enabled, then idles.
//
// Every mutation of shared state is one short critical section; user
// code is never called from inside one.

pub mod callback;
pub mod clock;
pub mod config;
pub mod poll;
pub mod polled;
pub mod queue;
pub mod runloop;
pub mod scheduler;
pub mod soft_timer;
pub mod task;
pub mod timer;
pub mod wake;

pub use callback::{Callback, Deferred, Event, InterruptCallback, TaskCallback};
pub use clock::{Clock, TickClock};
pub use poll::{IdlePoller, PollRate};
pub use polled::{OneShot, Periodic, PolledTimer};
pub use queue::{Overflow, Priority, QueueStats};
pub use runloop::{EventLoop, Pass};
pub use scheduler::{Consumer, PostError, Scheduler, SchedulerBuilder, init};
pub use soft_timer::SoftTimer;
pub use task::{Notification, Task, TaskLoop, TaskState};
pub use timer::{Service, Tick, TimerError, TimerId};
pub use wake::{Wake, WakeFlags, wait_for_interrupt};
