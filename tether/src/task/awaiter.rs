use super::Task;
use crate::error::TaskResult;

/// The awaiter contract of a [`Task`].
///
/// This is the minimal surface a suspend/resume mechanism needs:
/// - [`is_ready`](Awaiter::is_ready) to skip suspension when the task is done,
/// - [`on_ready`](Awaiter::on_ready) to resume once it completes,
/// - [`get_result`](Awaiter::get_result) to fetch the outcome.
#[derive(Debug, Clone)]
pub struct Awaiter {
    task: Task,
}

impl Awaiter {
    pub(crate) fn new(task: Task) -> Self {
        Self { task }
    }

    /// Returns `true` once the task has completed.
    pub fn is_ready(&self) -> bool {
        self.task.is_completed()
    }

    /// Schedules `continuation` to run once the task completes.
    ///
    /// May be called from any thread. The continuation runs once, on the
    /// task's pool.
    ///
    /// # Panics
    ///
    /// Panics if the task is pending and already holds a continuation.
    pub fn on_ready<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.task.on_completed(continuation);
    }

    /// Blocks until the task completes and returns its outcome.
    pub fn get_result(&self) -> TaskResult {
        self.task.wait()
    }
}
