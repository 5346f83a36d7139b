use super::Awaiter;
use crate::context::Snapshot;
use crate::error::{TaskError, TaskResult, UsageError};
use crate::pool::Pool;

use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use tracing::warn;

/// Callback stored on a pending task, invoked with its failure, if any.
type Continuation = Box<dyn FnOnce(Option<TaskError>) + Send + 'static>;

/// Completion record of a task.
///
/// All four fields change together under one lock: a producer completing
/// the task and a consumer subscribing to it must never both miss, or both
/// act on, the same continuation.
struct State {
    /// Set once, never reverts.
    completed: bool,

    /// Failure stored at completion; meaningful only once `completed`.
    error: Option<TaskError>,

    /// The single continuation waiting for completion.
    ///
    /// It is handed the stored failure instead of reading it back from the
    /// task, so it never owns the task it is stored on.
    continuation: Option<Continuation>,

    /// Ambient context active when `continuation` was registered.
    captured: Option<Snapshot>,
}

/// A single-assignment completion primitive.
///
/// A `Task` represents work that finishes exactly once, either successfully
/// or with a [`TaskError`]. It carries no result value.
///
/// Handles are cheap to clone; every clone observes the same completion.
/// Consumers either block with [`wait`](Task::wait) or chain work with
/// [`continue_with`](Task::continue_with). Continuations always run on the
/// task's [`Pool`], with the ambient context captured when they were
/// registered.
///
/// A task holds at most one continuation at a time. Registering a second
/// one while the task is still pending is a [`UsageError`].
#[derive(Clone)]
pub struct Task {
    /// Shared completion record.
    state: Arc<Mutex<State>>,

    /// Pool that runs this task's continuation.
    pool: Pool,
}

impl Task {
    /// Creates a pending task whose continuation will run on `pool`.
    ///
    /// The creator completes it with [`complete`](Task::complete),
    /// [`set_result`](Task::set_result) or [`set_error`](Task::set_error).
    pub fn new(pool: &Pool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                completed: false,
                error: None,
                continuation: None,
                captured: None,
            })),
            pool: pool.clone(),
        }
    }

    /// Creates a task that has already completed successfully.
    pub fn completed(pool: &Pool) -> Self {
        let task = Self::new(pool);
        task.state.lock().completed = true;
        task
    }

    /// Creates a task that has already failed with `error`.
    pub fn failed(pool: &Pool, error: impl Into<TaskError>) -> Self {
        let task = Self::new(pool);
        {
            let mut state = task.state.lock();
            state.completed = true;
            state.error = Some(error.into());
        }
        task
    }

    /// The pool that runs this task's continuation.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Completes the task, successfully if `error` is `None`.
    ///
    /// If a continuation is registered, it is handed to the pool together
    /// with the context captured at registration. Otherwise the outcome is
    /// only recorded and a later subscriber sees it directly.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::AlreadyCompleted`] if the task was already
    /// completed; the stored outcome is left untouched.
    pub fn try_complete(&self, error: Option<TaskError>) -> Result<(), UsageError> {
        let pending = {
            let mut state = self.state.lock();

            if state.completed {
                return Err(UsageError::AlreadyCompleted);
            }

            state.completed = true;
            state.error = error;

            let captured = state.captured.take();
            let error = state.error.clone();
            state.continuation.take().map(|c| (c, error, captured))
        };

        if let Some((continuation, error, captured)) = pending {
            self.pool
                .enqueue_with(Box::new(move || continuation(error)), captured);
        }

        Ok(())
    }

    /// Completes the task, successfully if `error` is `None`.
    ///
    /// # Panics
    ///
    /// Panics if the task was already completed.
    pub fn complete(&self, error: Option<TaskError>) {
        if let Err(usage) = self.try_complete(error) {
            panic!("{usage}");
        }
    }

    /// Completes the task successfully.
    ///
    /// # Panics
    ///
    /// Panics if the task was already completed.
    pub fn set_result(&self) {
        self.complete(None);
    }

    /// Completes the task with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the task was already completed.
    pub fn set_error(&self, error: impl Into<TaskError>) {
        self.complete(Some(error.into()));
    }

    /// Returns `true` once the task has completed, successfully or not.
    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Returns `true` if the task has completed with an error.
    pub fn is_failed(&self) -> bool {
        let state = self.state.lock();
        state.completed && state.error.is_some()
    }

    /// The stored error, if the task has completed with one.
    pub fn error(&self) -> Option<TaskError> {
        let state = self.state.lock();

        if state.completed {
            state.error.clone()
        } else {
            None
        }
    }

    /// Registers the continuation of this task.
    ///
    /// If the task is already completed, `callback` is handed to the pool
    /// straight away with the context captured now. Otherwise it is stored,
    /// together with a snapshot of the current ambient context, and the
    /// completer hands it to the pool. Either way it runs exactly once, on a
    /// worker, never inline on the calling stack.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::ContinuationAlreadyRegistered`] if the task is
    /// pending and already holds a continuation. `callback` is dropped.
    pub fn try_on_completed<F>(&self, callback: F) -> Result<(), UsageError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_subscribe(move |_| callback())
    }

    /// Registers a continuation that receives the task's failure, if any.
    ///
    /// Combinators subscribe through here so their continuations never hold
    /// a handle to the task they wait on.
    pub(crate) fn try_subscribe<F>(&self, callback: F) -> Result<(), UsageError>
    where
        F: FnOnce(Option<TaskError>) + Send + 'static,
    {
        let error = {
            let mut state = self.state.lock();

            if !state.completed {
                if state.continuation.is_some() {
                    return Err(UsageError::ContinuationAlreadyRegistered);
                }

                state.continuation = Some(Box::new(callback));
                state.captured = self.pool.capture();

                return Ok(());
            }

            state.error.clone()
        };

        self.pool.enqueue(move || callback(error));

        Ok(())
    }

    /// Registers the continuation of this task.
    ///
    /// # Panics
    ///
    /// Panics if the task is pending and already holds a continuation.
    pub fn on_completed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(usage) = self.try_on_completed(callback) {
            panic!("{usage}");
        }
    }

    /// Blocks the calling thread until the task completes.
    ///
    /// Returns the stored error unchanged if the task failed.
    ///
    /// The wake-up signal is delivered through the pool like any other
    /// continuation, so calling `wait` from a pool worker can deadlock when
    /// every worker is waiting.
    ///
    /// # Panics
    ///
    /// Panics if the task is pending and already holds a continuation.
    pub fn wait(&self) -> TaskResult {
        if !self.is_completed() {
            let (transmitter, receiver) = mpsc::channel();

            self.on_completed(move || {
                let _ = transmitter.send(());
            });

            // A disconnect means the signal was dropped unsent; the state
            // below is still authoritative.
            let _ = receiver.recv();
        }

        match self.error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Chains `action` after this task and returns the task tracking it.
    ///
    /// When this task completes successfully, `action` runs on the pool;
    /// its `Err` or panic fails the returned task, otherwise the returned
    /// task succeeds. When this task fails, `action` is skipped and the
    /// returned task fails with the same error, so a failure anywhere in a
    /// chain reaches its end.
    ///
    /// Returns immediately.
    ///
    /// # Panics
    ///
    /// Panics if this task is pending and already holds a continuation.
    pub fn continue_with<F>(&self, action: F) -> Task
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        let child = Task::new(&self.pool);
        let completer = child.clone();

        let subscribed = self.try_subscribe(move |parent_error| {
            let outcome = match parent_error {
                Some(error) => Err(error),
                None => invoke(action),
            };

            completer.finish(outcome);
        });

        if let Err(usage) = subscribed {
            panic!("{usage}");
        }

        child
    }

    /// Returns the awaiter view of this task.
    pub fn awaiter(&self) -> Awaiter {
        Awaiter::new(self.clone())
    }

    /// Returns `true` if both handles refer to the same task.
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Completes a task owned by a combinator.
    ///
    /// Those tasks are completed by exactly one path; a usage error here is
    /// logged instead of unwinding through a worker.
    pub(crate) fn finish(&self, outcome: TaskResult) {
        if let Err(usage) = self.try_complete(outcome.err()) {
            warn!(error = %usage, "internal task completed twice");
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("Task")
            .field("completed", &state.completed)
            .field("error", &state.error)
            .field("has_continuation", &state.continuation.is_some())
            .finish()
    }
}

/// Runs an action, turning a panic into a [`TaskError`].
pub(crate) fn invoke<F>(action: F) -> TaskResult
where
    F: FnOnce() -> TaskResult,
{
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}
