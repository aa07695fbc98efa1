// Dispatch loop: fire due timers -> sweep queues -> idle -> repeat
//
// Each pass services timers first so that any callbacks they post run in
// the same sweep. The loop only idles when a pass did nothing and no
// producer has signalled since; the idle budget is capped by the next
// timer due so a backed-off poller never makes a timer late.

use log::debug;

use super::poll::IdlePoller;
use super::scheduler::Scheduler;
use super::timer::Tick;
use super::wake::wait_for_interrupt;

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pass {
    pub fired: usize,
    pub serviced: usize,
    /// Ticks until the next timer is due, if any is armed.
    pub next_due: Option<Tick>,
}

impl Pass {
    pub fn is_idle(&self) -> bool {
        self.fired == 0 && self.serviced == 0
    }
}

pub struct EventLoop<'a> {
    sched: &'a Scheduler,
    poller: IdlePoller,
}

impl<'a> EventLoop<'a> {
    pub fn new(sched: &'a Scheduler) -> Self {
        Self {
            sched,
            poller: IdlePoller::new(),
        }
    }

    pub fn scheduler(&self) -> &'a Scheduler {
        self.sched
    }

    pub fn poller(&self) -> &IdlePoller {
        &self.poller
    }

    pub fn run_once(&mut self) -> Pass {
        let (fired, next_due) = self.sched.service_timers();
        let serviced = self.sched.dispatch();
        let pass = Pass {
            fired,
            serviced,
            next_due,
        };

        if pass.is_idle() {
            if self.poller.on_idle() {
                debug!("runloop: backing off to {}", self.poller.rate());
            }
        } else {
            self.poller.on_activity();
        }
        pass
    }

    /// How long the loop may idle after `pass`.
    pub fn idle_budget(&self, pass: &Pass) -> Tick {
        let poll = self.poller.interval_ticks();
        match pass.next_due {
            Some(due) => due.min(poll),
            None => poll,
        }
    }

    /// Run passes until `done` returns true. `idle` is handed the budget
    /// in ticks whenever there is nothing to do.
    pub fn run_until<I, D>(&mut self, mut idle: I, mut done: D)
    where
        I: FnMut(Tick),
        D: FnMut() -> bool,
    {
        while !done() {
            let pass = self.run_once();
            if !pass.is_idle() {
                continue;
            }
            // a post or kick since the pass started means more work already
            if self.sched.wake().take().is_some() {
                continue;
            }
            let budget = self.idle_budget(&pass);
            if budget > 0 {
                idle(budget);
            }
        }
    }

    pub fn run<I: FnMut(Tick)>(&mut self, idle: I) -> ! {
        self.run_until(idle, || false);
        unreachable!()
    }

    /// `run` with the default idle: sleep until the next interrupt.
    pub fn run_forever(&mut self) -> ! {
        self.run(|_| wait_for_interrupt())
    }
}
