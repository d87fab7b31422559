use spindle::task;
use spindle::time::{self, Deadline};
use spindle::{TaskState, WaitError};

use std::time::{Duration, Instant};

#[spindle::test]
fn sleep_for_waits_at_least_the_duration() {
    let started = Instant::now();
    time::sleep_for(Duration::from_millis(30)).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[spindle::test(worker_threads = 1)]
fn sleeping_tasks_do_not_block_the_worker() {
    let sleepers: Vec<_> = (0..20)
        .map(|_| task::spawn(|| time::sleep_for(Duration::from_millis(50))).unwrap())
        .collect();

    let started = Instant::now();
    for sleeper in sleepers {
        assert_eq!(sleeper.get(), Ok(Ok(())));
    }

    // Twenty sleeps on one worker overlap instead of adding up.
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[spindle::test]
fn sleep_until_a_past_deadline_returns_immediately() {
    let deadline = Deadline::at(Instant::now());

    assert_eq!(time::sleep_until(deadline), Ok(()));
}

#[spindle::test]
fn shorter_sleeps_finish_first() {
    let long = task::spawn(|| {
        time::sleep_for(Duration::from_millis(60)).unwrap();
        Instant::now()
    })
    .unwrap();
    let short = task::spawn(|| {
        time::sleep_for(Duration::from_millis(10)).unwrap();
        Instant::now()
    })
    .unwrap();

    assert!(short.get().unwrap() < long.get().unwrap());
}

#[spindle::test]
fn unbounded_sleep_ends_on_cancellation() {
    let sleeper = task::spawn(|| time::sleep_until(Deadline::unreachable())).unwrap();

    while sleeper.state() != TaskState::Suspended {
        task::yield_now();
    }
    sleeper.request_cancel();

    assert_eq!(sleeper.get(), Ok(Err(WaitError::Cancelled)));
}

#[test]
fn sleep_outside_a_task_parks_the_thread() {
    let started = Instant::now();

    assert_eq!(time::sleep_for(Duration::from_millis(10)), Ok(()));
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[test]
fn wait_error_messages() {
    assert_eq!(WaitError::Timeout.to_string(), "wait timed out");
    assert!(WaitError::Cancelled.to_string().contains("cancellation"));
}
