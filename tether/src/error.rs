//! Error types.
//!
//! Two families of failure exist in the crate:
//! - [`UsageError`]: misuse of a task (completing twice, subscribing twice).
//!   These are fatal to the caller and are surfaced synchronously.
//! - [`TaskError`]: a failure produced by a computation. It is stored on the
//!   task that the computation was completing and handed back to whoever
//!   reads the task's outcome.
//!
//! [`PoolError`] covers the only fallible part of pool construction.

use std::any::Any;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Boxed, thread-safe error accepted by [`TaskError::new`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Outcome of a wrapped action.
pub type TaskResult = Result<(), TaskError>;

/// Misuse of the task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The task was completed a second time.
    #[error("task is already completed")]
    AlreadyCompleted,

    /// A continuation was registered on a task that already holds one.
    #[error("a continuation is already registered on this task")]
    ContinuationAlreadyRegistered,
}

/// Failure raised by a computation and stored on a task.
///
/// `TaskError` is cheap to clone: every holder of a failed task observes the
/// same underlying error object, so [`TaskError::downcast_ref`] reaches the
/// value that was originally raised.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The computation returned an error.
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync + 'static>),

    /// The computation panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Wraps an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        TaskError::Failed(Arc::new(error))
    }

    /// Builds an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Failed(Arc::from(BoxError::from(message.into())))
    }

    /// Converts a panic payload caught with `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };

        TaskError::Panicked(message)
    }

    /// Returns `true` if the computation panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }

    /// Returns a reference to the original error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            TaskError::Failed(inner) => inner.downcast_ref::<E>(),
            TaskError::Panicked(_) => None,
        }
    }

    /// Returns `true` when both values refer to the same stored error.
    pub fn ptr_eq(&self, other: &TaskError) -> bool {
        match (self, other) {
            (TaskError::Failed(a), TaskError::Failed(b)) => Arc::ptr_eq(a, b),
            (TaskError::Panicked(a), TaskError::Panicked(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        TaskError::msg(message)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        TaskError::msg(message)
    }
}

impl From<BoxError> for TaskError {
    fn from(error: BoxError) -> Self {
        TaskError::Failed(Arc::from(error))
    }
}

impl From<UsageError> for TaskError {
    fn from(error: UsageError) -> Self {
        TaskError::new(error)
    }
}

/// Failure while building a [`Pool`](crate::Pool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// The operating system refused to spawn a pool thread.
    #[error("failed to spawn pool thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}
