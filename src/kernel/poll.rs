// Adaptive idle budget for the dispatch loop
// NOTE: Instead of re-entering at a fixed rate, back off while nothing happens:
// - work every pass: re-enter fast (one base interval)
// - recently busy: moderate (5x)
// - idle: slow (10x) so the core sleeps longer between passes
// An armed timer always caps the budget, so backing off never makes one late.

use core::fmt;

use super::config::{BASE_POLL_TICKS, FAST_TO_NORMAL, NORMAL_TO_SLOW};
use super::timer::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollRate {
    #[default]
    Fast,
    Normal,
    Slow,
}

impl PollRate {
    // base intervals between passes at this rate
    pub const fn divisor(self) -> u32 {
        match self {
            PollRate::Fast => 1,
            PollRate::Normal => 5,
            PollRate::Slow => 10,
        }
    }

    pub const fn interval_ticks(self) -> Tick {
        self.divisor() * BASE_POLL_TICKS
    }
}

impl fmt::Display for PollRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollRate::Fast => write!(f, "Fast({}t)", self.interval_ticks()),
            PollRate::Normal => write!(f, "Normal({}t)", self.interval_ticks()),
            PollRate::Slow => write!(f, "Slow({}t)", self.interval_ticks()),
        }
    }
}

pub struct IdlePoller {
    rate: PollRate,
    // consecutive idle passes
    idle_count: u32,
}

impl IdlePoller {
    pub const fn new() -> Self {
        Self {
            rate: PollRate::Fast,
            idle_count: 0,
        }
    }

    pub fn on_activity(&mut self) {
        self.rate = PollRate::Fast;
        self.idle_count = 0;
    }

    /// Returns true if the rate changed.
    pub fn on_idle(&mut self) -> bool {
        self.idle_count = self.idle_count.saturating_add(1);

        match self.rate {
            PollRate::Fast if self.idle_count >= FAST_TO_NORMAL => {
                self.rate = PollRate::Normal;
                self.idle_count = 0;
                true
            }
            PollRate::Normal if self.idle_count >= NORMAL_TO_SLOW => {
                self.rate = PollRate::Slow;
                true
            }
            _ => false,
        }
    }

    pub fn rate(&self) -> PollRate {
        self.rate
    }

    pub fn interval_ticks(&self) -> Tick {
        self.rate.interval_ticks()
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    pub fn set_rate(&mut self, rate: PollRate) {
        self.rate = rate;
        self.idle_count = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for IdlePoller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_off_in_steps() {
        let mut p = IdlePoller::new();
        assert_eq!(p.interval_ticks(), BASE_POLL_TICKS);

        for _ in 0..FAST_TO_NORMAL - 1 {
            assert!(!p.on_idle());
        }
        assert!(p.on_idle());
        assert_eq!(p.rate(), PollRate::Normal);

        for _ in 0..NORMAL_TO_SLOW - 1 {
            p.on_idle();
        }
        assert!(p.on_idle());
        assert_eq!(p.rate(), PollRate::Slow);
        assert!(!p.on_idle());
        assert_eq!(p.interval_ticks(), 10 * BASE_POLL_TICKS);
    }

    #[test]
    fn activity_snaps_back_to_fast() {
        let mut p = IdlePoller::new();
        p.set_rate(PollRate::Slow);
        p.on_activity();
        assert_eq!(p.rate(), PollRate::Fast);
        assert_eq!(p.idle_count(), 0);
    }
}
