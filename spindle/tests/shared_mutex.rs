use spindle::sync::SharedMutex;
use spindle::task::{self, TaskHandle};
use spindle::{TaskProcessorBuilder, TaskState, WaitError};

use rstest::rstest;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

fn wait_suspended<T>(handle: &TaskHandle<T>) {
    while handle.state() != TaskState::Suspended {
        task::yield_now();
    }
}

/// Readers count up, a writer stores -1; both sides assert the other is
/// absent.
#[rstest]
#[case(2, 40)]
#[case(4, 120)]
fn readers_and_writers_exclude_each_other(#[case] workers: usize, #[case] tasks: u64) {
    let processor = TaskProcessorBuilder::new().worker_threads(workers).build();

    let lock = Arc::new(SharedMutex::new(0u64));
    let holders = Arc::new(AtomicIsize::new(0));

    let handles: Vec<_> = (0..tasks)
        .map(|i| {
            let lock = lock.clone();
            let holders = holders.clone();

            processor
                .spawn(move || {
                    // Cheap deterministic shuffle of reads and writes.
                    let mut seed = i.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                    for _ in 0..8 {
                        seed ^= seed >> 33;
                        seed = seed.wrapping_mul(0xff51_afd7_ed55_8ccd);

                        if seed % 4 == 0 {
                            let mut guard = lock.write().unwrap();
                            assert_eq!(holders.swap(-1, Ordering::SeqCst), 0);
                            *guard += 1;
                            task::yield_now();
                            assert_eq!(holders.swap(0, Ordering::SeqCst), -1);
                        } else {
                            let guard = lock.read().unwrap();
                            assert!(holders.fetch_add(1, Ordering::SeqCst) >= 0);
                            let _ = *guard;
                            task::yield_now();
                            assert!(holders.fetch_sub(1, Ordering::SeqCst) >= 1);
                        }
                    }
                })
                .unwrap()
        })
        .collect();

    for handle in handles {
        handle.get().unwrap();
    }
}

#[spindle::test(worker_threads = 4)]
fn queued_writer_goes_before_later_reader() {
    let lock = Arc::new(SharedMutex::new(()));
    let order = Arc::new(StdMutex::new(Vec::new()));

    let readers: Vec<_> = (0..3).map(|_| lock.read().unwrap()).collect();
    assert_eq!(readers.len(), 3);

    let writer = {
        let lock = lock.clone();
        let order = order.clone();
        task::spawn(move || {
            let _guard = lock.write().unwrap();
            order.lock().unwrap().push("writer");
        })
        .unwrap()
    };
    wait_suspended(&writer);

    let late_reader = {
        let lock = lock.clone();
        let order = order.clone();
        task::spawn(move || {
            let _guard = lock.read().unwrap();
            order.lock().unwrap().push("reader");
        })
        .unwrap()
    };
    wait_suspended(&late_reader);

    assert!(lock.try_read().is_none());
    drop(readers);

    writer.get().unwrap();
    late_reader.get().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
}

#[spindle::test(worker_threads = 2)]
fn readers_behind_a_writer_are_admitted_together() {
    let lock = Arc::new(SharedMutex::new(7));
    let holding = Arc::new(AtomicIsize::new(0));
    let writer_guard = lock.write().unwrap();

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let lock = lock.clone();
            let holding = holding.clone();
            let handle = task::spawn(move || {
                let guard = lock.read().unwrap();
                holding.fetch_add(1, Ordering::SeqCst);
                // Only completes if all three readers hold the lock at once.
                while holding.load(Ordering::SeqCst) < 3 && !task::should_cancel() {
                    task::yield_now();
                }
                *guard
            })
            .unwrap();
            wait_suspended(&handle);
            handle
        })
        .collect();

    drop(writer_guard);

    for handle in readers {
        assert_eq!(handle.wait_for(Duration::from_secs(5)), Ok(()));
        assert_eq!(handle.get(), Ok(7));
    }
}

#[spindle::test]
fn timed_write_times_out_under_readers() {
    let lock = Arc::new(SharedMutex::new(()));
    let _reader = lock.read().unwrap();

    let other = lock.clone();
    let result = task::spawn(move || other.write_for(Duration::from_millis(10)).map(drop))
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(result, Err(WaitError::Timeout));

    // The retracted writer no longer blocks new readers.
    assert!(lock.try_read().is_some());
}

#[spindle::test]
fn try_variants_respect_current_holders() {
    let lock = SharedMutex::new(1);

    {
        let _read = lock.try_read().unwrap();
        assert!(lock.try_read().is_some());
        assert!(lock.try_write().is_none());
    }

    let mut write = lock.try_write().unwrap();
    *write += 1;
    assert!(lock.try_read().is_none());
    drop(write);

    assert_eq!(*lock.read().unwrap(), 2);
}

#[rstest]
#[case(2, 8)]
#[case(4, 16)]
fn grants_racing_timeouts_keep_holders_consistent(#[case] workers: usize, #[case] tasks: u64) {
    let processor = TaskProcessorBuilder::new().worker_threads(workers).build();

    let lock = Arc::new(SharedMutex::new(0u64));
    let holders = Arc::new(AtomicIsize::new(0));

    // A writer holding the lock for about as long as the others wait.
    let writer = {
        let lock = lock.clone();
        let holders = holders.clone();
        processor
            .spawn(move || {
                for _ in 0..40 {
                    let mut guard = lock.write().unwrap();
                    assert_eq!(holders.swap(-1, Ordering::SeqCst), 0);
                    *guard += 1;
                    spindle::time::sleep_for(Duration::from_micros(900)).unwrap();
                    assert_eq!(holders.swap(0, Ordering::SeqCst), -1);
                }
                40u64
            })
            .unwrap()
    };

    let contenders: Vec<_> = (0..tasks)
        .map(|i| {
            let lock = lock.clone();
            let holders = holders.clone();
            processor
                .spawn(move || {
                    let mut writes = 0u64;
                    for _ in 0..40 {
                        if i % 3 == 0 {
                            match lock.write_for(Duration::from_millis(1)) {
                                Ok(mut guard) => {
                                    assert_eq!(holders.swap(-1, Ordering::SeqCst), 0);
                                    *guard += 1;
                                    writes += 1;
                                    task::yield_now();
                                    assert_eq!(holders.swap(0, Ordering::SeqCst), -1);
                                }
                                Err(err) => assert_eq!(err, WaitError::Timeout),
                            }
                        } else {
                            match lock.read_for(Duration::from_millis(1)) {
                                Ok(guard) => {
                                    assert!(holders.fetch_add(1, Ordering::SeqCst) >= 0);
                                    let _ = *guard;
                                    task::yield_now();
                                    assert!(holders.fetch_sub(1, Ordering::SeqCst) >= 1);
                                }
                                Err(err) => assert_eq!(err, WaitError::Timeout),
                            }
                        }
                    }
                    writes
                })
                .unwrap()
        })
        .collect();

    let mut total = writer.get().unwrap();
    for contender in contenders {
        total += contender.get().unwrap();
    }

    assert_eq!(holders.load(Ordering::SeqCst), 0);
    assert_eq!(*lock.try_write().expect("shared mutex left locked"), total);
}
