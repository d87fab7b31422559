use spindle::sync::Mutex;
use spindle::task::{self, TaskHandle};
use spindle::time;
use spindle::{TaskError, TaskProcessorBuilder, TaskState, WaitError};

use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Yields until `handle` is parked at a wait point.
fn wait_suspended<T>(handle: &TaskHandle<T>) {
    while handle.state() != TaskState::Suspended {
        task::yield_now();
    }
}

#[rstest]
#[case(1, 10)]
#[case(2, 50)]
#[case(4, 200)]
fn mutual_exclusion_holds(#[case] workers: usize, #[case] tasks: usize) {
    let processor = TaskProcessorBuilder::new().worker_threads(workers).build();

    let mutex = Arc::new(Mutex::new(0usize));
    let inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let mutex = mutex.clone();
            let inside = inside.clone();

            processor
                .spawn(move || {
                    for _ in 0..5 {
                        let mut guard = mutex.lock().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        *guard += 1;
                        task::yield_now();
                        assert_eq!(inside.fetch_sub(1, Ordering::SeqCst), 1);
                    }
                })
                .unwrap()
        })
        .collect();

    for handle in handles {
        handle.get().unwrap();
    }

    assert_eq!(*mutex.try_lock().unwrap(), tasks * 5);
}

#[spindle::test(worker_threads = 4)]
fn waiters_acquire_in_arrival_order() {
    let mutex = Arc::new(Mutex::new(Vec::new()));
    let guard = mutex.lock().unwrap();

    let mut handles = Vec::new();
    for id in 1..=4 {
        let mutex = mutex.clone();
        let handle = task::spawn(move || mutex.lock().unwrap().push(id)).unwrap();
        wait_suspended(&handle);
        handles.push(handle);
    }

    drop(guard);

    for handle in handles {
        handle.get().unwrap();
    }

    assert_eq!(*mutex.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[spindle::test(worker_threads = 2)]
fn cancelled_waiter_resumes_with_cancellation() {
    let mutex = Arc::new(Mutex::new(()));
    let guard = mutex.lock().unwrap();
    let observed = Arc::new(AtomicBool::new(false));

    let waiter = {
        let mutex = mutex.clone();
        let observed = observed.clone();
        task::spawn(move || {
            let result = mutex.lock().map(drop);
            observed.store(result == Err(WaitError::Cancelled), Ordering::SeqCst);
        })
        .unwrap()
    };

    wait_suspended(&waiter);

    let started = Instant::now();
    waiter.request_cancel();
    assert_eq!(waiter.wait_for(Duration::from_secs(5)), Ok(()));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(observed.load(Ordering::SeqCst));
    assert_eq!(waiter.get(), Ok(()));

    drop(guard);
    assert!(mutex.try_lock().is_some());
}

#[spindle::test]
fn zero_timeout_on_held_mutex_times_out() {
    let mutex = Arc::new(Mutex::new(()));
    let _guard = mutex.lock().unwrap();

    let other = mutex.clone();
    let started = Instant::now();
    let result = task::spawn(move || other.lock_for(Duration::ZERO).map(drop))
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(result, Err(WaitError::Timeout));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[spindle::test(worker_threads = 2)]
fn timed_lock_gives_up_and_keeps_queue_consistent() {
    let mutex = Arc::new(Mutex::new(0));
    let guard = mutex.lock().unwrap();

    let timed = {
        let mutex = mutex.clone();
        task::spawn(move || mutex.lock_for(Duration::from_millis(20)).map(drop)).unwrap()
    };
    let patient = {
        let mutex = mutex.clone();
        task::spawn(move || *mutex.lock().unwrap() += 1).unwrap()
    };

    assert_eq!(timed.get().unwrap(), Err(WaitError::Timeout));

    drop(guard);
    patient.get().unwrap();
    assert_eq!(*mutex.lock().unwrap(), 1);
}

#[spindle::test]
fn zero_timeout_on_free_mutex_succeeds() {
    let mutex = Mutex::new(5);

    assert_eq!(*mutex.lock_for(Duration::ZERO).unwrap(), 5);
}

#[test]
fn tasks_and_threads_share_a_mutex() {
    let processor = TaskProcessorBuilder::new().worker_threads(2).build();
    let mutex = Arc::new(Mutex::new(0usize));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let mutex = mutex.clone();
            processor
                .spawn(move || {
                    for _ in 0..100 {
                        *mutex.lock().unwrap() += 1;
                    }
                })
                .unwrap()
        })
        .collect();

    let threads: Vec<_> = (0..2)
        .map(|_| {
            let mutex = mutex.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    *mutex.lock().unwrap() += 1;
                }
            })
        })
        .collect();

    for handle in tasks {
        handle.get().unwrap();
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(Arc::try_unwrap(mutex).unwrap().into_inner(), 1000);
}

#[spindle::test]
fn recursive_lock_panics() {
    let mutex = Arc::new(Mutex::new(()));

    let inner = mutex.clone();
    let result = task::spawn(move || {
        let _outer = inner.lock().unwrap();
        let _again = inner.lock();
    })
    .unwrap()
    .get();

    assert!(matches!(result, Err(TaskError::Panicked(msg)) if msg.contains("recursive lock")));
}

#[spindle::test]
fn unlock_by_non_owner_panics() {
    let mutex = Arc::new(spindle::sync::RawMutex::new());
    assert!(mutex.try_lock());

    let other = mutex.clone();
    let result = task::spawn(move || other.unlock()).unwrap().get();

    assert!(matches!(result, Err(TaskError::Panicked(msg)) if msg.contains("not owned")));
    mutex.unlock();
    assert!(!mutex.is_locked());
}

/// Counts the acquisitions of a contender, checking exclusivity each time.
fn hold_briefly(guard: &mut usize, inside: &AtomicUsize) {
    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
    *guard += 1;
    task::yield_now();
    assert_eq!(inside.fetch_sub(1, Ordering::SeqCst), 1);
}

#[rstest]
#[case(2, 8)]
#[case(4, 16)]
fn grants_racing_timeouts_keep_ownership_exact(#[case] workers: usize, #[case] tasks: usize) {
    let processor = TaskProcessorBuilder::new().worker_threads(workers).build();

    let mutex = Arc::new(Mutex::new(0usize));
    let inside = Arc::new(AtomicUsize::new(0));

    // Holds the mutex for about as long as the contenders are willing to wait.
    let holder = {
        let mutex = mutex.clone();
        let inside = inside.clone();
        processor
            .spawn(move || {
                for _ in 0..40 {
                    let mut guard = mutex.lock().unwrap();
                    hold_briefly(&mut guard, &inside);
                    time::sleep_for(Duration::from_micros(900)).unwrap();
                }
                40usize
            })
            .unwrap()
    };

    let contenders: Vec<_> = (0..tasks)
        .map(|_| {
            let mutex = mutex.clone();
            let inside = inside.clone();
            processor
                .spawn(move || {
                    let mut acquired = 0usize;
                    for _ in 0..40 {
                        match mutex.lock_for(Duration::from_millis(1)) {
                            Ok(mut guard) => {
                                hold_briefly(&mut guard, &inside);
                                acquired += 1;
                            }
                            Err(err) => assert_eq!(err, WaitError::Timeout),
                        }
                    }
                    acquired
                })
                .unwrap()
        })
        .collect();

    let mut total = holder.get().unwrap();
    for contender in contenders {
        total += contender.get().unwrap();
    }

    assert_eq!(*mutex.try_lock().expect("mutex left locked"), total);
}

#[spindle::test(worker_threads = 4)]
fn grants_racing_cancellation_keep_ownership_exact() {
    let mutex = Arc::new(Mutex::new(0usize));
    let inside = Arc::new(AtomicUsize::new(0));

    let contenders: Vec<_> = (0..12)
        .map(|_| {
            let mutex = mutex.clone();
            let inside = inside.clone();
            task::spawn(move || {
                let mut acquired = 0usize;
                // An uncontended lock succeeds on the fast path even when
                // cancelled, so the loop checks for cancellation itself too.
                while task::cancellation_point().is_ok() {
                    match mutex.lock() {
                        Ok(mut guard) => {
                            hold_briefly(&mut guard, &inside);
                            acquired += 1;
                        }
                        Err(err) => {
                            assert_eq!(err, WaitError::Cancelled);
                            break;
                        }
                    }
                }
                acquired
            })
            .unwrap()
        })
        .collect();

    // Cancel while ownership keeps being handed from waiter to waiter.
    for contender in &contenders {
        time::sleep_for(Duration::from_micros(300)).unwrap();
        contender.request_cancel();
    }

    let mut total = 0;
    for contender in contenders {
        total += contender.get().unwrap();
    }

    assert_eq!(*mutex.try_lock().expect("mutex left locked"), total);
}
