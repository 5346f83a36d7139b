use crate::pool::queue::Callback;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Handle used to send commands to the timer thread.
pub(crate) type TimerHandle = Sender<Command>;

/// Requests understood by the timer thread.
pub(crate) enum Command {
    /// Run `callback` once `deadline` is reached.
    SetTimer { deadline: Instant, callback: Callback },

    /// Stop the timer thread, discarding pending entries.
    Shutdown,
}

/// An entry in the timer queue.
///
/// Entries are ordered by deadline, then by insertion order so that timers
/// sharing a deadline fire in the order they were set.
struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Insertion sequence number, breaks ties between equal deadlines.
    sequence: u64,

    /// Callback invoked on the timer thread when the deadline is reached.
    callback: Callback,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Ord for TimerEntry {
    /// Reversed so that a `BinaryHeap<TimerEntry>` pops the earliest
    /// deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One-shot timer facility backing `delay`.
///
/// The timer runs on its own thread, receives [`Command`]s over a channel
/// and keeps pending entries in a min-heap. Callbacks are invoked on the
/// timer thread and must be short; the ones the pool installs only
/// complete a task, which hands any continuation to the workers.
pub(crate) struct Timer {
    receiver: Receiver<Command>,
    timers: BinaryHeap<TimerEntry>,
    sequence: u64,
}

impl Timer {
    /// Creates the timer and the handle used to feed it.
    pub(crate) fn new() -> (Self, TimerHandle) {
        let (transmitter, receiver) = channel();

        (
            Self {
                receiver,
                timers: BinaryHeap::new(),
                sequence: 0,
            },
            transmitter,
        )
    }

    /// Runs the timer loop until shut down.
    ///
    /// The loop also ends once every handle is dropped and no entry is
    /// left to fire.
    pub(crate) fn run(&mut self) {
        let mut disconnected = false;

        loop {
            self.fire_expired();

            let next = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            let command = match (next, disconnected) {
                (None, true) => break,
                (Some(timeout), true) => {
                    thread::sleep(timeout);
                    continue;
                }
                (None, false) => match self.receiver.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
                (Some(timeout), false) => match self.receiver.recv_timeout(timeout) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        disconnected = true;
                        continue;
                    }
                },
            };

            match command {
                Command::SetTimer { deadline, callback } => {
                    self.sequence += 1;
                    self.timers.push(TimerEntry {
                        deadline,
                        sequence: self.sequence,
                        callback,
                    });
                }
                Command::Shutdown => {
                    debug!(pending = self.timers.len(), "timer shut down");
                    return;
                }
            }
        }

        debug!("timer handles dropped, timer exiting");
    }

    /// Pops and runs every entry whose deadline has passed.
    fn fire_expired(&mut self) {
        let now = Instant::now();

        while self.timers.peek().is_some_and(|t| t.deadline <= now) {
            if let Some(timer) = self.timers.pop() {
                (timer.callback)();
            }
        }
    }
}
