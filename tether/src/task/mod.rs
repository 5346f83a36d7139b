//! Task primitives.
//!
//! This module defines the completion primitive of the crate and the
//! combinators built on it:
//! - [`Task`]: single-assignment completion with one continuation slot,
//!   blocking [`wait`](Task::wait) and [`continue_with`](Task::continue_with)
//!   chaining,
//! - [`Awaiter`]: the `is_ready` / `on_ready` / `get_result` contract a
//!   suspend/resume mechanism binds to,
//! - combinators on [`Pool`](crate::Pool): `run`, `when_all`, `delay` and
//!   `drive`, which keep no state of their own beyond the tasks they create.

mod awaiter;
mod combinators;
mod core;

pub use awaiter::Awaiter;
pub use self::core::Task;
