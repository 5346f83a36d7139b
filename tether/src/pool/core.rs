use super::builder::PoolBuilder;
use super::queue::{Callback, WorkItem, WorkQueue};
use super::timer::{Command, Timer, TimerHandle};
use super::worker::Worker;
use crate::context::{AmbientContext, Snapshot};
use crate::error::PoolError;

use std::fmt;
use std::io;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Handle to a fixed-size worker pool.
///
/// `Pool` is responsible for:
/// - running submitted callbacks on its worker threads,
/// - capturing the ambient context on submission and restoring it on the
///   worker,
/// - running the one-shot timers behind [`delay`](Pool::delay).
///
/// Handles are cheap to clone and every clone drives the same threads.
/// Tasks keep a handle to the pool that schedules their continuations.
/// When the last handle is dropped the queue is closed: workers finish the
/// items already queued and exit.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

struct Shared {
    /// Queue drained by every worker.
    queue: Arc<WorkQueue>,

    /// Ambient context provider.
    context: Arc<dyn AmbientContext>,

    /// Channel to the timer thread.
    timer: TimerHandle,

    /// Number of worker threads.
    worker_threads: usize,
}

static GLOBAL: OnceLock<Pool> = OnceLock::new();

impl Pool {
    /// Returns a builder for a new pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Creates a pool with the default configuration.
    pub fn new() -> Result<Self, PoolError> {
        PoolBuilder::new().build()
    }

    /// Returns the process-wide pool, starting it on first use.
    ///
    /// Its threads live until the process exits. Prefer an explicitly built
    /// pool passed to the code that needs it; the global one exists for
    /// callers that have nowhere to keep a handle.
    ///
    /// # Panics
    ///
    /// Panics if the pool threads cannot be spawned on first use.
    pub fn global() -> &'static Pool {
        GLOBAL.get_or_init(|| match Pool::new() {
            Ok(pool) => pool,
            Err(error) => panic!("failed to start the global pool: {error}"),
        })
    }

    pub(crate) fn start(
        worker_threads: usize,
        name: &str,
        context: Arc<dyn AmbientContext>,
    ) -> Result<Self, PoolError> {
        let queue = Arc::new(WorkQueue::new());
        let (mut timer, handle) = Timer::new();

        // Dropping `pool` on an early return closes the queue and stops the
        // timer, so threads spawned so far exit.
        let pool = Self {
            shared: Arc::new(Shared {
                queue: queue.clone(),
                context,
                timer: handle,
                worker_threads,
            }),
        };

        spawn(format!("{name}-timer"), move || timer.run())?;

        for id in 0..worker_threads {
            let worker = Worker::new(id, queue.clone());
            spawn(format!("{name}-{id}"), move || worker.run())?;
        }

        debug!(worker_threads, name, "pool started");

        Ok(pool)
    }

    /// Number of worker threads serving this pool.
    pub fn worker_threads(&self) -> usize {
        self.shared.worker_threads
    }

    /// Number of callbacks queued and not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Submits a callback to the pool.
    ///
    /// The ambient context is captured now and restored around the callback
    /// on the worker. Returns immediately.
    ///
    /// The callback should not panic; failures meant to be observed belong
    /// in [`run`](Pool::run), which captures them into a task.
    pub fn enqueue<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_with(Box::new(callback), self.capture());
    }

    /// Submits a callback with an explicitly captured snapshot.
    pub(crate) fn enqueue_with(&self, callback: Callback, snapshot: Option<Snapshot>) {
        self.shared.queue.push(WorkItem { callback, snapshot });
    }

    /// Captures the ambient context of the calling thread.
    pub(crate) fn capture(&self) -> Option<Snapshot> {
        self.shared.context.capture()
    }

    /// Arms a one-shot timer.
    ///
    /// Returns `false` if the timer thread is gone; the callback is dropped.
    pub(crate) fn schedule(&self, deadline: Instant, callback: Callback) -> bool {
        self.shared
            .timer
            .send(Command::SetTimer { deadline, callback })
            .is_ok()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("worker_threads", &self.shared.worker_threads)
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}

impl Drop for Shared {
    /// Shuts the pool down once no handle is left.
    ///
    /// This performs the following steps:
    /// 1. Closes the queue, letting workers drain it and exit
    /// 2. Sends a shutdown command to the timer
    ///
    /// Threads are not joined: the last handle may be dropped by a callback
    /// running on one of the workers.
    fn drop(&mut self) {
        self.queue.close();

        let _ = self.timer.send(Command::Shutdown);

        debug!("pool handles dropped, shutting down");
    }
}

fn spawn<F>(name: String, f: F) -> Result<(), PoolError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map(drop)
        .map_err(|source: io::Error| PoolError::Spawn { name, source })
}
