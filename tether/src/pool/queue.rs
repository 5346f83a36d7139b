use crate::context::Snapshot;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A unit of work submitted to the pool.
pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A callback paired with the ambient context captured when it was
/// submitted.
///
/// Work items are immutable once enqueued and consumed by exactly one
/// worker.
pub(crate) struct WorkItem {
    /// Work to run.
    pub(crate) callback: Callback,

    /// Context restored around `callback`, if any was captured.
    pub(crate) snapshot: Option<Snapshot>,
}

struct State {
    items: VecDeque<WorkItem>,
    closed: bool,
}

/// The pool's shared, unbounded work queue.
///
/// Every worker blocks on the same queue. Pushing never blocks beyond the
/// internal lock, and a parked worker is woken for every pushed item.
pub(crate) struct WorkQueue {
    /// Pending items and the closed flag, guarded together so that a worker
    /// cannot miss a close while deciding to park.
    state: Mutex<State>,

    /// Wakes parked workers.
    condvar: Condvar,
}

impl WorkQueue {
    /// Creates an empty, open queue.
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Appends an item and wakes one parked worker.
    pub(crate) fn push(&self, item: WorkItem) {
        self.state.lock().items.push_back(item);
        self.condvar.notify_one();
    }

    /// Takes the oldest item, parking until one is available.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub(crate) fn pop(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }

            if state.closed {
                return None;
            }

            self.condvar.wait(&mut state);
        }
    }

    /// Closes the queue and wakes every parked worker.
    ///
    /// Items already queued are still handed out by [`pop`](Self::pop).
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.condvar.notify_all();
    }

    /// Number of items waiting to be picked up.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}
