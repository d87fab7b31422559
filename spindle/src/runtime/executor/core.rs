use super::worker::Worker;
use crate::runtime::core::Shared;
use crate::runtime::work_stealing::queue::LocalQueue;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The worker threads of a task processor.
///
/// The `Executor` spawns one thread per worker, each owning a local queue,
/// and joins them on shutdown.
pub(crate) struct Executor {
    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl Executor {
    /// Spawns `threads` workers named `<name>-worker-<n>`.
    ///
    /// On failure the workers already spawned are stopped and joined.
    pub(crate) fn start(shared: &Arc<Shared>, threads: usize) -> io::Result<Self> {
        let locals: Vec<LocalQueue> = (0..threads).map(|_| LocalQueue::new()).collect();
        let stealers = Arc::new(locals.iter().map(LocalQueue::stealer).collect::<Vec<_>>());

        let mut executor = Self {
            handles: Vec::with_capacity(threads),
        };

        for (id, local) in locals.into_iter().enumerate() {
            let worker = Worker::new(id, local, stealers.clone(), shared.clone());

            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{id}", shared.name()))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => executor.handles.push(handle),
                Err(err) => {
                    shared.injector().shutdown();
                    executor.join();
                    return Err(err);
                }
            }
        }

        Ok(executor)
    }

    /// Waits for all worker threads to terminate.
    ///
    /// This should be called after the injector was shut down.
    pub(crate) fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("a worker thread panicked");
            }
        }
    }
}
