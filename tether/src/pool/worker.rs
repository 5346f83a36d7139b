use crate::error::TaskError;
use crate::pool::queue::{WorkItem, WorkQueue};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// A worker thread of the pool.
///
/// The execution loop is:
/// 1. Block until the shared queue hands out an item
/// 2. Restore the item's captured context, if any
/// 3. Run the callback
/// 4. Repeat until the queue is closed and drained
pub(crate) struct Worker {
    /// Index of the worker, used in logs.
    id: usize,

    /// Queue shared by every worker of the pool.
    queue: Arc<WorkQueue>,
}

impl Worker {
    /// Creates a new worker bound to the shared queue.
    pub(crate) fn new(id: usize, queue: Arc<WorkQueue>) -> Self {
        Self { id, queue }
    }

    /// Runs the worker loop on the current thread.
    ///
    /// Callbacks built by the task layer catch their own failures. A raw
    /// callback that panics is a caller bug; the unwind is logged and the
    /// worker keeps serving the queue so the pool stays at full size.
    pub(crate) fn run(&self) {
        debug!(worker = self.id, "worker started");

        while let Some(item) = self.queue.pop() {
            trace!(worker = self.id, "running work item");

            let WorkItem { callback, snapshot } = item;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match snapshot {
                Some(snapshot) => snapshot.run_within(callback),
                None => callback(),
            }));

            if let Err(payload) = outcome {
                error!(
                    worker = self.id,
                    error = %TaskError::from_panic(payload),
                    "work item panicked outside of a task"
                );
            }
        }

        debug!(worker = self.id, "work queue closed, worker exiting");
    }
}
