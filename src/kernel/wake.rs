// Wake flag signaling between producers and the dispatch loop
//
// Producers (ISRs included) set atomic flags; the loop consumes them via
// take(). Independent flags keep a post from swallowing a timer kick.
// Critical section makes the read-and-clear atomic on riscv32imc
// (no atomic RMW).

use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    /// Something was queued.
    pub posted: bool,
    /// A timer became the new list head.
    pub timer: bool,
}

pub struct WakeFlags {
    posted: AtomicBool,
    timer: AtomicBool,
}

impl WakeFlags {
    pub const fn new() -> Self {
        Self {
            posted: AtomicBool::new(false),
            timer: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn signal_posted(&self) {
        self.posted.store(true, Ordering::Release);
    }

    /// Kick the loop: the next expiry moved earlier.
    #[inline]
    pub fn signal_timer(&self) {
        self.timer.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.posted.load(Ordering::Acquire) || self.timer.load(Ordering::Acquire)
    }

    pub fn take(&self) -> Option<Wake> {
        critical_section::with(|_| {
            let posted = self.posted.load(Ordering::Relaxed);
            let timer = self.timer.load(Ordering::Relaxed);

            if !posted && !timer {
                return None;
            }

            if posted {
                self.posted.store(false, Ordering::Relaxed);
            }
            if timer {
                self.timer.store(false, Ordering::Relaxed);
            }

            Some(Wake { posted, timer })
        })
    }
}

impl Default for WakeFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack));
    }

    #[cfg(all(not(target_arch = "riscv32"), any(test, feature = "std")))]
    {
        std::thread::yield_now();
    }

    #[cfg(all(not(target_arch = "riscv32"), not(any(test, feature = "std"))))]
    {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_flags() {
        let flags = WakeFlags::new();
        assert_eq!(flags.take(), None);

        flags.signal_timer();
        assert!(flags.is_pending());
        assert_eq!(
            flags.take(),
            Some(Wake {
                posted: false,
                timer: true
            })
        );
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn flags_are_independent() {
        let flags = WakeFlags::new();
        flags.signal_posted();
        flags.signal_timer();
        let wake = flags.take().unwrap();
        assert!(wake.posted && wake.timer);
        assert!(!flags.is_pending());
    }
}
