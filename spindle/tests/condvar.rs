use spindle::sync::{ConditionVariable, CvStatus, Mutex};
use spindle::task::{self, TaskHandle};
use spindle::time::Deadline;
use spindle::{TaskProcessorBuilder, TaskState};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Shared {
    ready: Mutex<bool>,
    cv: ConditionVariable,
}

fn shared() -> Arc<Shared> {
    Arc::new(Shared {
        ready: Mutex::new(false),
        cv: ConditionVariable::new(),
    })
}

fn wait_suspended<T>(handle: &TaskHandle<T>) {
    while handle.state() != TaskState::Suspended {
        task::yield_now();
    }
}

#[spindle::test(worker_threads = 2)]
fn notify_one_wakes_a_waiter() {
    let state = shared();

    let waiter = {
        let state = state.clone();
        task::spawn(move || {
            let mut ready = state.ready.lock().unwrap();
            let mut status = CvStatus::NoTimeout;
            while !*ready {
                status = state.cv.wait(&mut ready);
            }
            status
        })
        .unwrap()
    };
    wait_suspended(&waiter);

    *state.ready.lock().unwrap() = true;
    state.cv.notify_one();

    assert_eq!(waiter.get(), Ok(CvStatus::NoTimeout));
}

#[spindle::test(worker_threads = 4)]
fn notify_all_wakes_every_waiter() {
    let state = shared();

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let state = state.clone();
            let handle = task::spawn(move || {
                let mut ready = state.ready.lock().unwrap();
                state.cv.wait_while(&mut ready, Deadline::unreachable(), |ready| *ready)
            })
            .unwrap();
            wait_suspended(&handle);
            handle
        })
        .collect();

    *state.ready.lock().unwrap() = true;
    state.cv.notify_all();

    for waiter in waiters {
        assert_eq!(waiter.get(), Ok(true));
    }
}

#[spindle::test]
fn timed_wait_times_out_and_relocks() {
    let state = shared();
    let mut ready = state.ready.lock().unwrap();

    let started = Instant::now();
    let status = state.cv.wait_for(&mut ready, Duration::from_millis(20));

    assert_eq!(status, CvStatus::Timeout);
    assert!(status.timed_out());
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(!*ready);
    assert!(state.ready.try_lock().is_none());
}

#[spindle::test]
fn wait_while_reports_unsatisfied_predicate_on_timeout() {
    let state = shared();
    let mut ready = state.ready.lock().unwrap();

    let satisfied = state
        .cv
        .wait_while(&mut ready, Deadline::from_duration(Duration::from_millis(10)), |ready| *ready);

    assert!(!satisfied);
}

#[spindle::test(worker_threads = 2)]
fn cancelled_waiter_returns_cancelled_holding_the_mutex() {
    let state = shared();

    let waiter = {
        let state = state.clone();
        task::spawn(move || {
            let mut ready = state.ready.lock().unwrap();
            let status = state.cv.wait(&mut ready);
            // The guard is valid again: the mutex was re-acquired.
            *ready = true;
            status
        })
        .unwrap()
    };
    wait_suspended(&waiter);

    waiter.request_cancel();
    assert_eq!(waiter.wait_for(Duration::from_secs(5)), Ok(()));
    assert!(*state.ready.lock().unwrap());
}

#[test]
fn plain_thread_waits_for_a_task() {
    let processor = TaskProcessorBuilder::new().worker_threads(1).build();
    let state = shared();

    let notifier = {
        let state = state.clone();
        processor
            .spawn(move || {
                spindle::time::sleep_for(Duration::from_millis(10)).unwrap();
                *state.ready.lock().unwrap() = true;
                state.cv.notify_all();
            })
            .unwrap()
    };

    let waiter = {
        let state = state.clone();
        thread::spawn(move || {
            let mut ready = state.ready.lock().unwrap();
            state.cv.wait_while(&mut ready, Deadline::from_duration(Duration::from_secs(5)), |ready| *ready)
        })
    };

    assert!(waiter.join().unwrap());
    notifier.get().unwrap();
}
