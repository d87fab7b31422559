use spindle::PoolError;
use spindle::coro::{Pool, PoolConfig};

use rstest::rstest;
use std::sync::Arc;
use std::thread;

fn pool(initial_size: usize, max_size: usize) -> Pool {
    Pool::new(PoolConfig {
        initial_size,
        max_size,
        stack_size: 64 * 1024,
    })
    .unwrap()
}

#[test]
fn returned_coroutines_are_reused() {
    let pool = pool(2, 4);

    {
        let mut token = pool.token();
        let a = pool.acquire(&mut token).unwrap();
        let b = pool.acquire(&mut token).unwrap();
        assert_eq!(pool.stats().active, 2);

        pool.release(&mut token, a);
        pool.release(&mut token, b);
    }

    let mut token = pool.token();
    let a = pool.acquire(&mut token).unwrap();
    let b = pool.acquire(&mut token).unwrap();

    // Nothing new was allocated.
    assert_eq!(pool.stats().total, 2);
    assert_eq!(pool.stats().active, 2);

    pool.release(&mut token, a);
    pool.release(&mut token, b);
}

#[test]
fn release_beyond_max_destroys() {
    let pool = pool(0, 1);
    let mut token = pool.token();

    let a = pool.acquire(&mut token).unwrap();
    let b = pool.acquire(&mut token).unwrap();
    assert_eq!(pool.stats().total, 2);

    pool.release(&mut token, a);
    pool.release(&mut token, b);

    let stats = pool.stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.total, 1);
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(8)]
fn counters_are_conserved_under_concurrency(#[case] threads: usize) {
    let pool = Arc::new(pool(4, 16));

    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut token = pool.token();
                for round in 0..200 {
                    let held: Vec<_> = (0..(round % 5) + 1)
                        .map(|_| pool.acquire(&mut token).unwrap())
                        .collect();

                    let stats = pool.stats();
                    assert!(stats.active <= stats.total);

                    for coroutine in held {
                        pool.release(&mut token, coroutine);
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total, stats.idle);
}

#[test]
fn stack_size_is_rounded_to_pages() {
    let pool = Pool::new(PoolConfig {
        initial_size: 1,
        max_size: 1,
        stack_size: 10_000,
    })
    .unwrap();

    let page = 4096;
    assert!(pool.stack_size() >= 10_000);
    assert_eq!(pool.stack_size() % page, 0);
}

#[test]
fn impossible_stack_reports_resource_exhausted() {
    let result = Pool::new(PoolConfig {
        initial_size: 1,
        max_size: 1,
        stack_size: usize::MAX / 2,
    });

    assert!(matches!(result, Err(PoolError::ResourceExhausted { .. })));
}
