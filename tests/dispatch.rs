// Queue capacity, sweep bounds and priority order through the public API.

use std::cell::RefCell;

use proptest::prelude::*;
use pulp_sched::kernel::config::QUEUE_LEN;
use pulp_sched::kernel::{Event, Priority, Scheduler, TickClock};

thread_local! {
    static SEEN: RefCell<Vec<(u32, usize)>> = const { RefCell::new(Vec::new()) };
    static SCHED: RefCell<Option<&'static Scheduler>> = const { RefCell::new(None) };
}

fn record(event: Event) {
    if let Some(pair) = event.run() {
        SEEN.with(|s| s.borrow_mut().push(pair));
    }
}

// re-posts itself once to the same priority while being drained
fn record_and_repost(event: Event) {
    if let Some((signal, param)) = event.run() {
        SEEN.with(|s| s.borrow_mut().push((signal, param)));
        if param == 0 {
            let sched = SCHED.with(|s| *s.borrow()).expect("scheduler registered");
            assert!(sched.post(Priority::High, signal + 100, 1));
        }
    }
}

fn take_seen() -> Vec<(u32, usize)> {
    SEEN.with(|s| s.borrow_mut().drain(..).collect())
}

fn scheduler(consumer: fn(Event)) -> &'static Scheduler {
    let clock: &'static TickClock = Box::leak(Box::new(TickClock::new(1)));
    let sched = Scheduler::builder(clock)
        .consumer(Priority::High, consumer)
        .consumer(Priority::Low, consumer)
        .build();
    Box::leak(Box::new(sched))
}

#[test]
fn drain_services_only_what_was_queued_at_entry() {
    let sched = scheduler(record_and_repost);
    SCHED.with(|s| *s.borrow_mut() = Some(sched));

    for i in 0..4 {
        assert!(sched.post(Priority::High, i, 0));
    }
    assert_eq!(sched.drain(Priority::High), 4);
    assert_eq!(sched.queue_stats(Priority::High).pending, 4);

    assert_eq!(sched.drain(Priority::High), 4);
    let seen = take_seen();
    let signals: Vec<u32> = seen.iter().map(|(s, _)| *s).collect();
    assert_eq!(signals, [0, 1, 2, 3, 100, 101, 102, 103]);
    assert_eq!(sched.drain(Priority::High), 0);
}

#[test]
fn interleaved_priorities_dispatch_in_strict_order() {
    let sched = scheduler(record);
    // callback priority (Normal) records through a closure
    let posts = [
        (Priority::High, 1),
        (Priority::Low, 1),
        (Priority::Normal, 1),
        (Priority::High, 2),
        (Priority::Low, 2),
        (Priority::Normal, 2),
    ];
    for (p, n) in posts {
        let signal = p as u32 * 10 + n;
        if p == Priority::Normal {
            assert!(sched.queue_closure(move || {
                SEEN.with(|s| s.borrow_mut().push((signal, 0)));
            }));
        } else {
            assert!(sched.post(p, signal, 0));
        }
    }

    assert_eq!(sched.dispatch(), 6);
    let signals: Vec<u32> = take_seen().iter().map(|(s, _)| *s).collect();
    assert_eq!(signals, [21, 22, 11, 12, 1, 2]);
}

#[test]
fn callback_queue_statistics() {
    fn noop(_: usize) {}
    let sched = scheduler(record);
    for _ in 0..5 {
        assert!(sched.queue_callback(noop, 0));
    }
    assert_eq!(sched.task_count(), 5);
    sched.dispatch();
    assert!(sched.queue_callback(noop, 0));
    assert_eq!(sched.task_count(), 1);
    assert_eq!(sched.max_task_count(), 5);
    assert_eq!(sched.pending(), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Post,
    Drain,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Post),
        1 => Just(Op::Drain),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn post_fails_exactly_when_full(ops in proptest::collection::vec(op(), 0..200)) {
        let sched = scheduler(record);
        let mut model = 0usize;

        for op in ops {
            match op {
                Op::Post => {
                    let ok = sched.post(Priority::Low, 0, 0);
                    prop_assert_eq!(ok, model < QUEUE_LEN);
                    if ok {
                        model += 1;
                    }
                }
                Op::Drain => {
                    let n = sched.drain(Priority::Low);
                    prop_assert_eq!(n, model);
                    model = 0;
                }
            }
            prop_assert_eq!(sched.queue_stats(Priority::Low).pending, model);
        }
        take_seen();
    }

    #[test]
    fn drained_slots_are_all_reusable(offset in 0..QUEUE_LEN) {
        // rotate the ring so the full/empty boundary lands at any index
        let sched = scheduler(record);
        for _ in 0..offset {
            prop_assert!(sched.post(Priority::Low, 0, 0));
        }
        prop_assert_eq!(sched.drain(Priority::Low), offset);

        for i in 0..QUEUE_LEN {
            prop_assert!(sched.post(Priority::Low, i as u32, 0));
        }
        prop_assert!(!sched.post(Priority::Low, 0, 0));

        let k = sched.drain(Priority::Low);
        prop_assert_eq!(k, QUEUE_LEN);
        for _ in 0..k {
            prop_assert!(sched.post(Priority::Low, 0, 0));
        }
        prop_assert!(!sched.post(Priority::Low, 0, 0));
        take_seen();
    }
}
