use super::Task;
use super::core::invoke;
use crate::error::{TaskError, TaskResult};
use crate::pool::Pool;

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error};

impl Pool {
    /// Runs `action` on the pool and returns the task tracking it.
    ///
    /// An `Err` returned by `action`, or a panic inside it, fails the task.
    /// Returns immediately.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let task = pool.run(|| Err("boom".into()));
    /// assert_eq!(task.wait().unwrap_err().to_string(), "boom");
    /// ```
    pub fn run<F>(&self, action: F) -> Task
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        let task = Task::new(self);
        let completer = task.clone();

        self.enqueue(move || completer.finish(invoke(action)));

        task
    }

    /// Returns a task that completes once every task in `tasks` has.
    ///
    /// An empty input yields an already completed task. Otherwise the
    /// result completes on the thread that observes the last input
    /// completion. If any input failed, the result fails with the first
    /// failure observed, in completion order; it still waits for every
    /// input before completing.
    ///
    /// An input that cannot be subscribed to, because it is pending and
    /// already holds a continuation, counts as an input that failed with
    /// that [`UsageError`](crate::UsageError) when the loop reaches it.
    pub fn when_all<I>(&self, tasks: I) -> Task
    where
        I: IntoIterator<Item = Task>,
    {
        let tasks: Vec<Task> = tasks.into_iter().collect();

        if tasks.is_empty() {
            return Task::completed(self);
        }

        let result = Task::new(self);
        let join = Arc::new(Join {
            remaining: AtomicUsize::new(tasks.len()),
            first_error: Mutex::new(None),
            result: result.clone(),
        });

        for task in tasks {
            let arrival = join.clone();

            if let Err(usage) = task.try_subscribe(move |error| arrival.arrive(error)) {
                join.arrive(Some(usage.into()));
            }
        }

        result
    }

    /// Returns a task that completes successfully after `duration`.
    ///
    /// A duration the clock cannot represent yields a task that never
    /// completes. An armed timer keeps the pool alive until it fires.
    pub fn delay(&self, duration: Duration) -> Task {
        let task = Task::new(self);

        // Past the end of the clock the deadline is never reached.
        let Some(deadline) = Instant::now().checked_add(duration) else {
            debug!(?duration, "delay exceeds the clock range, never fires");
            return task;
        };

        let completer = task.clone();
        let armed = self.schedule(deadline, Box::new(move || completer.finish(Ok(()))));

        if !armed {
            error!("timer thread is gone, failing delay");
            task.finish(Err(TaskError::msg("timer thread is not running")));
        }

        task
    }

    /// Same as [`delay`](Pool::delay), in milliseconds.
    pub fn delay_ms(&self, milliseconds: u64) -> Task {
        self.delay(Duration::from_millis(milliseconds))
    }

    /// Drives a sequence of tasks strictly one at a time.
    ///
    /// The next element is pulled only after the previous one has completed,
    /// so a lazily produced sequence starts each task only when its
    /// predecessor is done. The returned task:
    /// - fails with the error of the first element that fails, without
    ///   pulling any further element,
    /// - fails if pulling an element panics,
    /// - succeeds once the sequence is exhausted.
    ///
    /// The iterator is dropped as soon as the returned task's outcome is
    /// known. The first element is pulled on the calling thread; every
    /// later one is pulled on a pool worker.
    pub fn drive<I>(&self, tasks: I) -> Task
    where
        I: IntoIterator<Item = Task>,
        I::IntoIter: Send + 'static,
    {
        self.try_drive(tasks.into_iter().map(Ok))
    }

    /// Like [`drive`](Pool::drive), for sequences whose production can fail.
    ///
    /// An `Err` element fails the returned task with that error and stops
    /// the drive.
    pub fn try_drive<I>(&self, tasks: I) -> Task
    where
        I: IntoIterator<Item = Result<Task, TaskError>>,
        I::IntoIter: Send + 'static,
    {
        let result = Task::new(self);

        Driver {
            sequence: tasks.into_iter(),
            result: result.clone(),
        }
        .step();

        result
    }
}

/// Countdown shared by the inputs of one `when_all` call.
struct Join {
    remaining: AtomicUsize,
    first_error: Mutex<Option<TaskError>>,
    result: Task,
}

impl Join {
    /// Records one input outcome; the last arrival completes the result.
    fn arrive(&self, error: Option<TaskError>) {
        if let Some(error) = error {
            self.first_error.lock().get_or_insert(error);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let error = self.first_error.lock().take();
            self.result.finish(error.map_or(Ok(()), Err));
        }
    }
}

/// State of one `drive` call, moved from continuation to continuation.
struct Driver<S> {
    sequence: S,
    result: Task,
}

impl<S> Driver<S>
where
    S: Iterator<Item = Result<Task, TaskError>> + Send + 'static,
{
    /// Pulls the next element and subscribes to it.
    fn step(mut self) {
        let pulled = panic::catch_unwind(AssertUnwindSafe(|| self.sequence.next()));

        let next = match pulled {
            Ok(Some(Ok(next))) => next,
            Ok(Some(Err(error))) => return self.finish(Err(error)),
            Ok(None) => return self.finish(Ok(())),
            Err(payload) => return self.finish(Err(TaskError::from_panic(payload))),
        };

        let result = self.result.clone();

        let subscribed = next.try_subscribe(move |error| match error {
            Some(error) => self.finish(Err(error)),
            None => self.step(),
        });

        // The rejected continuation took the sequence with it.
        if let Err(usage) = subscribed {
            result.finish(Err(usage.into()));
        }
    }

    /// Releases the sequence, then completes the drive.
    fn finish(self, outcome: TaskResult) {
        let Driver { sequence, result } = self;

        drop(sequence);
        result.finish(outcome);
    }
}
