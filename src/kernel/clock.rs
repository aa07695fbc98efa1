// Tick source for the timer engine
//
// The hardware tick ISR calls `advance()`; everything else reads `now()`.
// Critical section guards the counter because riscv32imc has no atomic
// RMW. The weight lets the ISR keep counting in base ticks when the
// hardware timer is slowed down during idle.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use super::timer::Tick;

pub trait Clock: Sync {
    /// Current wrapping tick count.
    fn now(&self) -> Tick;

    fn ticks_per_ms(&self) -> u32 {
        1
    }

    fn ms_to_ticks(&self, ms: u32) -> u64 {
        ms as u64 * self.ticks_per_ms() as u64
    }
}

/// Software tick counter driven by a periodic interrupt (or by tests).
pub struct TickClock {
    ticks: Mutex<Cell<Tick>>,
    // base ticks per ISR (1 when active, >1 when the hardware timer is slowed)
    weight: AtomicU32,
    ticks_per_ms: u32,
}

impl TickClock {
    pub const fn new(ticks_per_ms: u32) -> Self {
        Self::starting_at(0, ticks_per_ms)
    }

    /// Start from an arbitrary count, e.g. just below the wrap point.
    pub const fn starting_at(start: Tick, ticks_per_ms: u32) -> Self {
        Self {
            ticks: Mutex::new(Cell::new(start)),
            weight: AtomicU32::new(1),
            ticks_per_ms: if ticks_per_ms == 0 { 1 } else { ticks_per_ms },
        }
    }

    /// One hardware tick elapsed. Safe to call from an ISR.
    #[inline]
    pub fn tick(&self) {
        let weight = self.weight.load(Ordering::Relaxed);
        self.advance(weight);
    }

    pub fn advance(&self, ticks: Tick) {
        critical_section::with(|cs| {
            let cell = self.ticks.borrow(cs);
            cell.set(cell.get().wrapping_add(ticks));
        });
    }

    pub fn set(&self, ticks: Tick) {
        critical_section::with(|cs| self.ticks.borrow(cs).set(ticks));
    }

    pub fn set_tick_weight(&self, weight: u32) {
        self.weight.store(weight.max(1), Ordering::Release);
    }

    pub fn tick_weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }
}

impl Clock for TickClock {
    fn now(&self) -> Tick {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    fn ticks_per_ms(&self) -> u32 {
        self.ticks_per_ms
    }
}
