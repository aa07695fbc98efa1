// Compile-time limits for the scheduler.
// All storage is sized from these constants; nothing grows at runtime.

use super::queue::Priority;
use super::timer::Tick;

/// Slots per priority queue.
pub const QUEUE_LEN: usize = 32;

/// Timer slots shared by every software timer and task.
pub const MAX_TIMERS: usize = 32;

/// Priority reserved for deferred callbacks. Its consumer is always
/// the built-in callback dispatcher.
pub const CALLBACK_PRIORITY: Priority = Priority::Normal;

/// Shortest interval a timer may be armed with; shorter requests are raised.
pub const MIN_TIMER_TICKS: Tick = 1;

/// Longest interval the signed tick comparison can order.
pub const MAX_TIMER_TICKS: Tick = i32::MAX as Tick;

/// Upper bound on the sub-interval count used for long timers.
pub const MAX_LONG_DIVIDER: u64 = u16::MAX as u64;

/// Headroom kept below `MAX_TIMER_TICKS` for polled timers so a late
/// poll still sees the expiry before the counter laps it.
pub const POLLED_MARGIN_TICKS: Tick = 250_000;

/// Base dispatch loop re-entry interval, in ticks.
pub const BASE_POLL_TICKS: Tick = 10;

// idle passes before the loop backs off
pub const FAST_TO_NORMAL: u32 = 20;
pub const NORMAL_TO_SLOW: u32 = 20;

/// Expiries handled by one `service_timers` call before yielding to dispatch.
pub const MAX_FIRES_PER_PASS: usize = 64;
