// Polled elapsed-time checkers
//
// For busy loops and drivers that just want "has N ticks passed?" without
// a timer slot or a callback. Elapsed time is the unsigned wrapping
// difference from the start tick, so it is correct across a counter wrap
// as long as the timer is polled at least once per lap.

use super::config::{MAX_TIMER_TICKS, POLLED_MARGIN_TICKS};
use super::timer::Tick;

pub type OneShot = PolledTimer<false>;
pub type Periodic = PolledTimer<true>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolledTimer<const PERIODIC: bool> {
    start: Tick,
    interval: Tick,
    never_expires: bool,
    // one-shot only: stays set until reset
    has_expired: bool,
}

impl<const PERIODIC: bool> PolledTimer<PERIODIC> {
    /// Longest interval that still leaves room for a late poll.
    pub const MAX_INTERVAL: Tick = MAX_TIMER_TICKS - POLLED_MARGIN_TICKS;

    pub fn new(now: Tick, interval: Tick) -> Self {
        let mut timer = Self {
            start: now,
            interval: 0,
            never_expires: false,
            has_expired: false,
        };
        timer.reset(now, interval);
        timer
    }

    /// Restart with a new interval. An interval over `MAX_INTERVAL` is
    /// accepted but never expires; that case returns false.
    pub fn reset(&mut self, now: Tick, interval: Tick) -> bool {
        self.start(now);
        self.interval = interval;
        self.never_expires = interval > Self::MAX_INTERVAL;
        !self.never_expires
    }

    /// Restart the current interval from `now`.
    pub fn start(&mut self, now: Tick) {
        self.start = now;
        if !PERIODIC {
            self.has_expired = false;
        }
    }

    /// Stop for good. A one-shot reports expired from now on; a periodic
    /// timer never fires again.
    pub fn cancel(&mut self) {
        self.interval = 1;
        self.never_expires = true;
        if !PERIODIC {
            self.has_expired = true;
        }
    }

    pub fn elapsed(&self, now: Tick) -> Tick {
        now.wrapping_sub(self.start)
    }

    pub fn interval(&self) -> Tick {
        self.interval
    }

    pub fn can_expire(&self) -> bool {
        !self.never_expires
    }

    /// False for a zero interval, which is always expired.
    pub fn can_wait(&self) -> bool {
        self.interval != 0
    }

    pub fn expired(&mut self, now: Tick) -> bool {
        if !self.can_wait() {
            return true;
        }
        if PERIODIC {
            let mut fired = false;
            // skip whole intervals so the phase never drifts
            while self.check(now) {
                self.start = self.start.wrapping_add(self.interval);
                fired = true;
            }
            fired
        } else {
            if !self.has_expired {
                self.has_expired = self.check(now);
            }
            self.has_expired
        }
    }

    fn check(&self, now: Tick) -> bool {
        !self.never_expires && self.elapsed(now) >= self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_latches_until_reset() {
        let mut t = OneShot::new(100, 50);
        assert!(!t.expired(149));
        assert!(t.expired(150));
        // still expired even if the clock is polled "before" the deadline again
        assert!(t.expired(120));

        t.start(200);
        assert!(!t.expired(210));
    }

    #[test]
    fn periodic_keeps_phase() {
        let mut t = Periodic::new(0, 10);
        assert!(t.expired(13));
        assert!(!t.expired(19));
        // polled late across two periods: one report, phase kept at 30
        assert!(t.expired(35));
        assert!(!t.expired(39));
        assert!(t.expired(40));
    }

    #[test]
    fn zero_interval_is_always_expired() {
        let mut t = OneShot::new(0, 0);
        assert!(!t.can_wait());
        assert!(t.expired(0));
    }

    #[test]
    fn too_long_never_expires() {
        let mut t = OneShot::new(0, 0);
        assert!(!t.reset(0, Tick::MAX));
        assert!(!t.can_expire());
        assert!(!t.expired(u32::MAX / 2));
    }

    #[test]
    fn elapsed_spans_wraparound() {
        let mut t = OneShot::new(u32::MAX - 4, 10);
        assert_eq!(t.elapsed(2), 7);
        assert!(!t.expired(4));
        assert!(t.expired(5));
    }

    #[test]
    fn cancel_semantics() {
        let mut one = OneShot::new(0, 100);
        one.cancel();
        assert!(one.expired(1));

        let mut every = Periodic::new(0, 100);
        every.cancel();
        assert!(!every.expired(1_000));
    }
}
