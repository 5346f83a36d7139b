//! # Tether
//!
//! **Tether** is a small task/promise engine running on a fixed-size pool of
//! worker threads. It lets computations be scheduled, chained and awaited
//! without any async runtime: every step is a plain callback, and the only
//! blocking operation is an explicit [`Task::wait`].
//!
//! It offers:
//!
//! - A **single-assignment [`Task`]** that completes exactly once, with or
//!   without an error, and hands its continuation to the pool
//! - A **fixed [`Pool`]** of worker threads draining one unbounded queue
//! - **Ambient context propagation**: values set with [`context::scope`] are
//!   visible again when a continuation runs on another thread
//! - **Combinators**: [`Pool::run`], [`Pool::when_all`], [`Pool::delay`] and
//!   [`Pool::drive`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::{Pool, TaskError};
//!
//! let pool = Pool::builder().worker_threads(4).build()?;
//!
//! let task = pool
//!     .run(|| {
//!         println!("first stage");
//!         Ok(())
//!     })
//!     .continue_with(|| Err(TaskError::msg("second stage failed")));
//!
//! assert!(task.wait().is_err());
//! ```
//!
//! ## Modules
//!
//! - [`context`]: Ambient context capture and restore
//! - [`error`]: Usage, computation and pool errors
//! - [`task`]: The task primitive and its awaiter

mod pool;

pub mod context;
pub mod error;
pub mod task;

pub use error::{BoxError, PoolError, TaskError, TaskResult, UsageError};
pub use pool::{Pool, PoolBuilder};
pub use task::{Awaiter, Task};
