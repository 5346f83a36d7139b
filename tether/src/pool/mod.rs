//! Worker pool.
//!
//! This module contains the executor side of the crate:
//! - [`core`]: the [`Pool`] handle and its lifecycle,
//! - [`builder`]: configuration of worker count, thread names and the
//!   ambient context provider,
//! - [`queue`]: the shared unbounded work queue,
//! - [`worker`]: the loop run by each worker thread,
//! - [`timer`]: the one-shot timer thread behind `delay`.
//!
//! Workers never steal from each other and there is no priority: every
//! callback goes through the same FIFO queue.

mod core;

pub(crate) mod builder;
pub(crate) mod queue;
pub(crate) mod timer;
pub(crate) mod worker;

pub use builder::PoolBuilder;
pub use self::core::Pool;
