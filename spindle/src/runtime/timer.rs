use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::task::Waker;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A timer scheduled on the timer thread.
///
/// Each entry represents a deadline at which the associated task
/// should be woken, unless it was retracted in the meantime.
pub(crate) struct TimerEntry {
    /// Absolute time at which the timer expires.
    deadline: Instant,

    /// Waker fired once the deadline is reached.
    waker: Waker,

    /// Set by whichever side is done with the entry first: the timer thread
    /// when it fires, or the waiter when its wait ended on its own.
    done: Arc<AtomicBool>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap` pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.deadline.cmp(&self.deadline)
    }
}

/// Commands sent to the timer thread.
pub(crate) enum Command {
    /// Registers a new timer.
    SetTimer(TimerEntry),

    /// A pending entry was retracted by its waiter.
    Retracted,

    /// Requests the timer thread to stop.
    Shutdown,
}

/// Sending side of the timer thread.
#[derive(Clone)]
pub(crate) struct TimerHandle {
    sender: Sender<Command>,
}

impl TimerHandle {
    /// Spawns the timer thread of a processor.
    pub(crate) fn start(name: &str) -> io::Result<(Self, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || run(receiver))?;

        Ok((Self { sender }, handle))
    }

    fn set(&self, entry: TimerEntry) {
        // The thread outlives every task; a closed channel means shutdown
        // already completed and nobody waits anymore.
        let _ = self.sender.send(Command::SetTimer(entry));
    }

    fn retracted(&self) {
        let _ = self.sender.send(Command::Retracted);
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

/// Timer registration of a single wait.
///
/// Dropping the guard retracts the entry; the timer thread then discards it
/// without waking anyone.
#[derive(Default)]
pub(crate) struct TimerGuard {
    armed: Option<(Arc<AtomicBool>, TimerHandle)>,
}

impl TimerGuard {
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Schedules `waker` to fire at `deadline`, once per guard.
    pub(crate) fn arm(&mut self, timer: &TimerHandle, waker: Waker, deadline: Instant) {
        if self.is_armed() {
            return;
        }

        let done = Arc::new(AtomicBool::new(false));
        timer.set(TimerEntry {
            deadline,
            waker,
            done: done.clone(),
        });
        self.armed = Some((done, timer.clone()));
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some((done, timer)) = &self.armed {
            // Still pending on the timer thread: let it reclaim the entry.
            if !done.swap(true, Ordering::AcqRel) {
                timer.retracted();
            }
        }
    }
}

/// Timer thread loop: fires expired entries, then sleeps until the next
/// deadline or the next command.
///
/// Retracted entries are dropped when they reach the top of the heap, or
/// all at once when they make up half of it, so that a long pending
/// deadline cannot pin the wakers of many short finished waits.
fn run(receiver: Receiver<Command>) {
    let mut timers: BinaryHeap<TimerEntry> = BinaryHeap::new();
    let mut retracted = 0usize;

    loop {
        let now = Instant::now();

        while let Some(entry) = timers.peek() {
            let is_retracted = entry.done.load(Ordering::Acquire);
            if !is_retracted && entry.deadline > now {
                break;
            }
            let Some(entry) = timers.pop() else { break };
            if entry.done.swap(true, Ordering::AcqRel) {
                retracted = retracted.saturating_sub(1);
            } else {
                entry.waker.wake();
            }
        }

        let command = match timers.peek() {
            Some(next) => receiver.recv_timeout(next.deadline.saturating_duration_since(now)),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(Command::SetTimer(entry)) => timers.push(entry),
            Ok(Command::Retracted) => {
                retracted += 1;
                if retracted * 2 >= timers.len() {
                    timers.retain(|entry| !entry.done.load(Ordering::Acquire));
                    retracted = 0;
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    tracing::debug!(pending = timers.len(), "timer thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::task::Wake;
    use std::time::Duration;

    struct CountingWaker(AtomicBool);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn expired_entry_fires_its_waker() {
        let (timer, thread) = TimerHandle::start("fire").unwrap();
        let flag = Arc::new(CountingWaker(AtomicBool::new(false)));

        let mut guard = TimerGuard::default();
        guard.arm(&timer, Waker::from(flag.clone()), Instant::now() + Duration::from_millis(5));

        assert!(wait_for(|| flag.0.load(Ordering::SeqCst)));

        drop(guard);
        timer.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn retracted_entries_behind_a_long_deadline_are_released() {
        let (timer, thread) = TimerHandle::start("compact").unwrap();
        let far = Instant::now() + Duration::from_secs(3600);

        let long = Arc::new(CountingWaker(AtomicBool::new(false)));
        let mut pending = TimerGuard::default();
        pending.arm(&timer, Waker::from(long.clone()), far);

        let short = Arc::new(CountingWaker(AtomicBool::new(false)));
        for _ in 0..10 {
            let mut guard = TimerGuard::default();
            guard.arm(&timer, Waker::from(short.clone()), far);
            drop(guard);
        }

        // Only the local reference is left once every entry is discarded.
        assert!(wait_for(|| Arc::strong_count(&short) == 1));
        assert_eq!(Arc::strong_count(&long), 2);
        assert!(!short.0.load(Ordering::SeqCst));

        drop(pending);
        timer.shutdown();
        thread.join().unwrap();
    }
}
