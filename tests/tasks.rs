// Task lifecycle on a live event loop.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use pulp_sched::kernel::config::QUEUE_LEN;
use pulp_sched::kernel::{
    EventLoop, Notification, Scheduler, Task, TaskLoop, TaskState, Tick, TickClock,
};

fn setup(ticks_per_ms: u32) -> (&'static TickClock, &'static Scheduler) {
    let clock: &'static TickClock = Box::leak(Box::new(TickClock::new(ticks_per_ms)));
    (clock, Box::leak(Box::new(Scheduler::new(clock))))
}

fn spawn<L: TaskLoop>(sched: &'static Scheduler, body: L) -> &'static Task<L> {
    Box::leak(Box::new(Task::new(sched, body).unwrap()))
}

#[derive(Default)]
struct Blinker {
    steps: AtomicUsize,
    woke_at: Mutex<Vec<Tick>>,
}

impl TaskLoop for Blinker {
    // one step per wake, then back to sleep
    fn step(&self, task: &'static Task<Self>) {
        let n = self.steps.fetch_add(1, Ordering::SeqCst);
        self.woke_at.lock().unwrap().push(task.scheduler().now());
        if n < 4 {
            task.sleep(50).unwrap();
        } else {
            task.suspend();
        }
    }
}

#[test]
fn sleeping_task_wakes_on_schedule() {
    let (clock, sched) = setup(1);
    let task = spawn(sched, Blinker::default());
    task.resume();

    let mut el = EventLoop::new(sched);
    el.run_until(
        |ticks| clock.advance(ticks),
        || task.state() == TaskState::Suspended,
    );

    assert_eq!(task.body().steps.load(Ordering::SeqCst), 5);
    assert_eq!(*task.body().woke_at.lock().unwrap(), [0, 50, 100, 150, 200]);
}

#[derive(Default)]
struct Spinner {
    steps: AtomicUsize,
    notes: Mutex<Vec<Notification>>,
}

impl TaskLoop for Spinner {
    fn step(&self, _task: &'static Task<Self>) {
        self.steps.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, n: Notification) {
        self.notes.lock().unwrap().push(n);
    }
}

#[test]
fn resumed_task_runs_without_sleep_or_suspend() {
    let (_, sched) = setup(1);
    let task = spawn(sched, Spinner::default());
    task.resume();
    assert_eq!(task.state(), TaskState::Running);

    let mut el = EventLoop::new(sched);
    for _ in 0..10 {
        el.run_once();
    }
    assert_eq!(task.body().steps.load(Ordering::SeqCst), 10);
    assert_eq!(*task.body().notes.lock().unwrap(), [Notification::Resumed]);
}

#[test]
fn resume_right_after_sleep_cancels_the_wake() {
    let (clock, sched) = setup(1);
    let task = spawn(sched, Spinner::default());
    task.resume();
    let mut el = EventLoop::new(sched);
    el.run_once();

    task.sleep(100).unwrap();
    task.resume();
    assert_eq!(task.state(), TaskState::Running);

    clock.advance(100);
    let pass = el.run_once();
    assert_eq!(pass.fired, 0);
    assert_eq!(task.state(), TaskState::Running);
}

#[test]
fn later_sleep_ignores_stale_wake() {
    let (clock, sched) = setup(1);
    let task = spawn(sched, Spinner::default());
    task.sleep(10).unwrap();

    // fires and posts a wake, but the task goes back to sleep first
    clock.advance(10);
    assert_eq!(sched.service_timers().0, 1);
    task.sleep(30).unwrap();
    sched.dispatch();
    assert_eq!(task.state(), TaskState::Sleeping);

    clock.advance(30);
    sched.service_timers();
    sched.dispatch();
    assert_eq!(task.state(), TaskState::Running);
}

#[test]
fn sleep_ms_uses_clock_rate() {
    let (_, sched) = setup(1_000);
    let task = spawn(sched, Spinner::default());
    task.sleep_ms(3).unwrap();
    assert_eq!(sched.remaining(task.timer()), Some(3_000));
}

#[test]
fn suspend_from_sleep_disarms() {
    let (_, sched) = setup(1);
    let task = spawn(sched, Spinner::default());
    task.sleep(10).unwrap();
    task.suspend();
    assert_eq!(task.state(), TaskState::Suspended);
    assert!(!sched.is_armed(task.timer()));
    assert_eq!(
        *task.body().notes.lock().unwrap(),
        [Notification::Suspending]
    );
}

#[test]
fn sleep_survives_a_full_callback_queue() {
    fn noop(_: usize) {}
    let (clock, sched) = setup(1);
    let task = spawn(sched, Spinner::default());
    task.sleep(10).unwrap();

    for _ in 0..QUEUE_LEN {
        assert!(sched.queue_callback(noop, 0));
    }
    clock.advance(10);
    // the wake could not be posted, so the timer goes round again
    assert_eq!(sched.service_timers(), (1, Some(1)));
    assert!(sched.is_armed(task.timer()));
    assert_eq!(task.state(), TaskState::Sleeping);

    sched.dispatch();
    clock.advance(1);
    assert_eq!(sched.service_timers().0, 1);
    sched.dispatch();
    assert_eq!(task.state(), TaskState::Running);
    sched.dispatch();
    assert_eq!(task.body().steps.load(Ordering::SeqCst), 1);
}
