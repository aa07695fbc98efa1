// Software timer engine
//
// Timers live in a fixed slot table. Armed slots are threaded into a
// singly linked list sorted by absolute expiry tick; the head is always
// the next timer due. Links are slot indices, never pointers, and every
// slot carries an explicit state so "disarmed" can't be mistaken for
// "last in list".
//
// Tick values are wrapping u32 counters. Two ticks are only ever compared
// through their signed difference, which orders them correctly as long
// as they are less than 2^31 ticks apart.
//
// The engine never calls user code: `service` reports which timer fired
// and the owner posts its callback onto the deferred callback queue.

use core::fmt;

use super::callback::Callback;
use super::config::{MAX_LONG_DIVIDER, MAX_TIMER_TICKS, MIN_TIMER_TICKS};

pub type Tick = u32;

/// Signed distance from `b` to `a`.
#[inline]
pub const fn tick_diff(a: Tick, b: Tick) -> i32 {
    a.wrapping_sub(b) as i32
}

/// True once `now` has reached or passed `expiry`.
#[inline]
pub const fn is_due(expiry: Tick, now: Tick) -> bool {
    tick_diff(now, expiry) >= 0
}

/// Bring an interval into the range the engine can order.
/// Returns the effective interval and whether it was changed.
pub const fn clamp_interval(ticks: Tick) -> (Tick, bool) {
    if ticks < MIN_TIMER_TICKS {
        (MIN_TIMER_TICKS, true)
    } else if ticks > MAX_TIMER_TICKS {
        (MAX_TIMER_TICKS, true)
    } else {
        (ticks, false)
    }
}

/// Slot index plus the slot's generation when it was handed out, so an
/// id kept past `release` cannot reach the slot's next owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    index: u16,
    generation: u16,
}

impl TimerId {
    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Every slot is in use.
    Exhausted,
    /// The id refers to a slot that has been released.
    Released(TimerId),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::Exhausted => write!(f, "no free timer slots"),
            TimerError::Released(id) => write!(f, "{} has been released", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Free,
    Disarmed,
    Armed,
}

/// Result of one service step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// No timer is armed.
    Idle,
    /// Head timer is due in this many ticks.
    Pending(Tick),
    /// This timer expired and was removed (or re-queued if repeating).
    Fired(TimerId),
}

/// What `arm` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armed {
    /// The timer became the list head; a sleeping loop should be kicked.
    pub head: bool,
    /// Effective per-expiry interval.
    pub interval: Tick,
    pub clamped: bool,
}

#[derive(Clone, Copy)]
struct Node {
    state: NodeState,
    next: Option<u16>,
    expiry: Tick,
    interval: Tick,
    // 0 = one-shot; long timers always re-queue and use `repeating`
    period: Tick,
    repeating: bool,
    callback: Option<Callback>,
    long_limit: u16,
    long_count: u16,
    // bumped on release
    generation: u16,
}

impl Node {
    const EMPTY: Self = Self {
        state: NodeState::Free,
        next: None,
        expiry: 0,
        interval: 0,
        period: 0,
        repeating: false,
        callback: None,
        long_limit: 0,
        long_count: 0,
        generation: 0,
    };
}

pub struct TimerList<const N: usize> {
    nodes: [Node; N],
    head: Option<u16>,
    free: Option<u16>,
    armed: usize,
    allocated: usize,
}

impl<const N: usize> TimerList<N> {
    const FITS: () = assert!(N <= u16::MAX as usize, "timer slots are addressed by u16");

    pub const fn new() -> Self {
        let () = Self::FITS;
        let mut nodes = [Node::EMPTY; N];
        let mut i = 0;
        while i + 1 < N {
            nodes[i].next = Some((i + 1) as u16);
            i += 1;
        }
        Self {
            nodes,
            head: None,
            free: if N == 0 { None } else { Some(0) },
            armed: 0,
            allocated: 0,
        }
    }

    /// Take a slot from the free list.
    pub fn create(&mut self) -> Result<TimerId, TimerError> {
        let idx = self.free.ok_or(TimerError::Exhausted)?;
        let node = &mut self.nodes[idx as usize];
        self.free = node.next;
        *node = Node {
            state: NodeState::Disarmed,
            generation: node.generation,
            ..Node::EMPTY
        };
        self.allocated += 1;
        Ok(self.id_of(idx))
    }

    /// Disarm the slot and return it to the free list. Releasing twice is a no-op.
    pub fn release(&mut self, id: TimerId) {
        if self.state(id) == NodeState::Free {
            return;
        }
        self.disarm(id);
        let node = &mut self.nodes[id.index()];
        *node = Node {
            generation: node.generation.wrapping_add(1),
            ..Node::EMPTY
        };
        node.next = self.free;
        self.free = Some(id.index);
        self.allocated -= 1;
    }

    /// A stale id (released since it was created) reads as `Free`.
    pub fn state(&self, id: TimerId) -> NodeState {
        match self.nodes.get(id.index()) {
            Some(n) if n.generation == id.generation => n.state,
            _ => NodeState::Free,
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.state(id) == NodeState::Armed
    }

    pub fn set_callback(&mut self, id: TimerId, callback: Callback) -> Result<(), TimerError> {
        self.live(id)?;
        self.nodes[id.index()].callback = Some(callback);
        Ok(())
    }

    pub fn callback(&self, id: TimerId) -> Option<Callback> {
        self.live(id).ok()?;
        self.nodes[id.index()].callback
    }

    /// Absolute expiry of an armed timer.
    pub fn expiry(&self, id: TimerId) -> Option<Tick> {
        self.is_armed(id).then(|| self.nodes[id.index()].expiry)
    }

    /// Disarm, then schedule `now + interval`. Re-arming an armed timer restarts it.
    pub fn arm(
        &mut self,
        id: TimerId,
        now: Tick,
        interval: Tick,
        repeating: bool,
    ) -> Result<Armed, TimerError> {
        self.live(id)?;
        self.disarm(id);

        let (interval, clamped) = clamp_interval(interval);
        let node = &mut self.nodes[id.index()];
        node.expiry = now.wrapping_add(interval);
        node.interval = interval;
        node.period = if repeating { interval } else { 0 };
        node.repeating = repeating;
        node.long_limit = 0;
        node.long_count = 0;

        let head = self.insert(id.index);
        Ok(Armed {
            head,
            interval,
            clamped,
        })
    }

    /// Arm with an interval that may exceed `MAX_TIMER_TICKS`.
    ///
    /// Long intervals are split into `div` equal sub-intervals and only the
    /// last one counts as an expiry. Precision is lost to integer division:
    /// the total is short by at most `div - 1` ticks.
    pub fn arm_long(
        &mut self,
        id: TimerId,
        now: Tick,
        interval: u64,
        repeating: bool,
    ) -> Result<Armed, TimerError> {
        let max = MAX_TIMER_TICKS as u64;
        if interval <= max {
            return self.arm(id, now, interval as Tick, repeating);
        }
        self.live(id)?;
        self.disarm(id);

        let mut clamped = false;
        let mut div = interval / (max + 1) + 1;
        if div > MAX_LONG_DIVIDER {
            div = MAX_LONG_DIVIDER;
            clamped = true;
        }
        let base = (interval / div).min(max) as Tick;

        let node = &mut self.nodes[id.index()];
        node.expiry = now.wrapping_add(base);
        node.interval = base;
        node.period = base;
        node.repeating = repeating;
        node.long_limit = div as u16;
        node.long_count = 0;

        let head = self.insert(id.index);
        Ok(Armed {
            head,
            interval: base,
            clamped,
        })
    }

    /// Unlink an armed timer. Returns false if it was not armed.
    pub fn disarm(&mut self, id: TimerId) -> bool {
        if !self.is_armed(id) {
            return false;
        }
        let idx = id.index;
        let mut prev: Option<u16> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            if c == idx {
                let next = self.nodes[c as usize].next;
                match prev {
                    None => self.head = next,
                    Some(p) => self.nodes[p as usize].next = next,
                }
                break;
            }
            prev = Some(c);
            cur = self.nodes[c as usize].next;
        }
        let node = &mut self.nodes[idx as usize];
        node.next = None;
        node.state = NodeState::Disarmed;
        node.long_count = 0;
        self.armed -= 1;
        true
    }

    /// Disarm every armed timer; returns how many were pending.
    pub fn disarm_all(&mut self) -> usize {
        let mut n = 0;
        while let Some(head) = self.head {
            self.disarm(self.id_of(head));
            n += 1;
        }
        n
    }

    /// Check the head against `now`.
    ///
    /// A due head is popped; repeating timers are re-queued at
    /// `previous expiry + period`, so late servicing never shifts later
    /// expiries. Intermediate sub-intervals of a long timer are absorbed here.
    pub fn service(&mut self, now: Tick) -> Service {
        loop {
            let Some(idx) = self.head else {
                return Service::Idle;
            };
            let remaining = tick_diff(self.nodes[idx as usize].expiry, now);
            if remaining > 0 {
                return Service::Pending(remaining as Tick);
            }

            let node = &mut self.nodes[idx as usize];
            self.head = node.next;
            node.next = None;
            node.state = NodeState::Disarmed;
            self.armed -= 1;

            let requeue = if node.long_limit != 0 {
                node.long_count += 1;
                if node.long_count < node.long_limit {
                    node.expiry = node.expiry.wrapping_add(node.period);
                    self.insert(idx);
                    continue;
                }
                node.long_count = 0;
                node.repeating
            } else {
                node.period != 0
            };

            if requeue {
                let node = &mut self.nodes[idx as usize];
                node.expiry = node.expiry.wrapping_add(node.period);
                self.insert(idx);
            }
            return Service::Fired(self.id_of(idx));
        }
    }

    /// Re-queue a one-shot timer that fired but whose callback could not be
    /// delivered, due again after `MIN_TIMER_TICKS`. No-op unless the timer
    /// is still disarmed; a long timer skips straight to its final expiry.
    pub fn retry(&mut self, id: TimerId, now: Tick) -> bool {
        if self.state(id) != NodeState::Disarmed {
            return false;
        }
        let node = &mut self.nodes[id.index()];
        node.expiry = now.wrapping_add(MIN_TIMER_TICKS);
        if node.long_limit != 0 {
            node.long_count = node.long_limit - 1;
        }
        self.insert(id.index);
        true
    }

    /// Ticks left on an armed timer, including outstanding long sub-intervals.
    pub fn remaining(&self, id: TimerId, now: Tick) -> Option<u64> {
        if !self.is_armed(id) {
            return None;
        }
        let node = &self.nodes[id.index()];
        let mut ticks = tick_diff(node.expiry, now).max(0) as u64;
        if node.long_limit != 0 {
            let left = node.long_limit.saturating_sub(node.long_count + 1);
            ticks += left as u64 * node.period as u64;
        }
        Some(ticks)
    }

    /// Full configured interval, in ticks, of an armed or previously armed timer.
    pub fn interval(&self, id: TimerId) -> Option<u64> {
        self.live(id).ok()?;
        let node = &self.nodes[id.index()];
        let mut ticks = node.interval as u64;
        if node.long_limit != 0 {
            ticks *= node.long_limit as u64;
        }
        Some(ticks)
    }

    /// Ticks until the head is due, if anything is armed.
    pub fn next_due(&self, now: Tick) -> Option<Tick> {
        let idx = self.head?;
        Some(tick_diff(self.nodes[idx as usize].expiry, now).max(0) as Tick)
    }

    /// Armed timers in the order they will fire.
    pub fn pending(&self) -> impl Iterator<Item = TimerId> + '_ {
        let mut cur = self.head;
        core::iter::from_fn(move || {
            let idx = cur?;
            cur = self.nodes[idx as usize].next;
            Some(self.id_of(idx))
        })
    }

    pub fn armed_count(&self) -> usize {
        self.armed
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn id_of(&self, idx: u16) -> TimerId {
        TimerId {
            index: idx,
            generation: self.nodes[idx as usize].generation,
        }
    }

    fn live(&self, id: TimerId) -> Result<(), TimerError> {
        match self.state(id) {
            NodeState::Free => Err(TimerError::Released(id)),
            _ => Ok(()),
        }
    }

    // Insert after every node whose expiry is not later, so equal
    // expiries fire in arming order. Returns true if it became the head.
    fn insert(&mut self, idx: u16) -> bool {
        let expiry = self.nodes[idx as usize].expiry;
        let mut prev: Option<u16> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            if tick_diff(expiry, self.nodes[c as usize].expiry) < 0 {
                break;
            }
            prev = Some(c);
            cur = self.nodes[c as usize].next;
        }

        let node = &mut self.nodes[idx as usize];
        node.next = cur;
        node.state = NodeState::Armed;
        self.armed += 1;
        match prev {
            None => {
                self.head = Some(idx);
                true
            }
            Some(p) => {
                self.nodes[p as usize].next = Some(idx);
                false
            }
        }
    }
}

impl<const N: usize> Default for TimerList<N> {
    fn default() -> Self {
        Self::new()
    }
}
