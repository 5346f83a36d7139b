use super::Pool;
use crate::context::{AmbientContext, ThreadLocalContext};
use crate::error::PoolError;

use std::sync::Arc;
use std::thread;

/// Builder for configuring and creating a [`Pool`].
///
/// # Examples
///
/// ```rust,ignore
/// let pool = PoolBuilder::new()
///     .worker_threads(4)
///     .thread_name("ingest")
///     .build()?;
/// ```
pub struct PoolBuilder {
    /// Number of worker threads.
    worker_threads: usize,

    /// Prefix of every thread name; workers get `{prefix}-{id}`, the timer
    /// gets `{prefix}-timer`.
    thread_name: String,

    /// Provider used to capture and restore the ambient context.
    context: Arc<dyn AmbientContext>,
}

impl PoolBuilder {
    /// Creates a new `PoolBuilder` with default configuration.
    ///
    /// By default, the number of worker threads is set to the number
    /// of available logical CPUs, falling back to `1` if unavailable, and
    /// the ambient context is the thread-local one.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            thread_name: "tether".to_owned(),
            context: Arc::new(ThreadLocalContext),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the prefix used to name pool threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Replaces the ambient context provider.
    ///
    /// Use [`NoContext`](crate::context::NoContext) to disable propagation.
    pub fn context<C: AmbientContext>(mut self, provider: C) -> Self {
        self.context = Arc::new(provider);
        self
    }

    /// Spawns the worker and timer threads and returns the pool handle.
    pub fn build(self) -> Result<Pool, PoolError> {
        Pool::start(self.worker_threads, &self.thread_name, self.context)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
