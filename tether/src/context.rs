//! Ambient execution context.
//!
//! An ambient context is the logical state that should follow a piece of
//! work when it hops threads: a value set by the code that registers a
//! continuation must be visible again when that continuation runs on a pool
//! worker.
//!
//! The pool only talks to the [`AmbientContext`] capability:
//! - [`AmbientContext::capture`] takes a point-in-time [`Snapshot`] whenever
//!   work is enqueued or a continuation is registered,
//! - [`Snapshot::run_within`] restores it for the duration of one callback
//!   and reverts afterwards, even if the callback panics.
//!
//! Two providers ship with the crate:
//! - [`ThreadLocalContext`] (the default) keeps an immutable frame of typed
//!   values in a thread-local slot. Values are installed with [`scope`] and
//!   read with [`get`].
//! - [`NoContext`] never captures anything.
//!
//! # Examples
//!
//! ```rust,ignore
//! struct RequestId(u64);
//!
//! tether::context::scope(RequestId(7), || {
//!     pool.run(|| {
//!         let id = tether::context::get::<RequestId>().unwrap();
//!         assert_eq!(id.0, 7);
//!         Ok(())
//!     });
//! });
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Capability used by the pool to snapshot the current ambient context.
pub trait AmbientContext: Send + Sync + 'static {
    /// Captures the context active on the calling thread.
    ///
    /// Returns `None` when there is nothing worth restoring, in which case
    /// the callback runs in whatever context the worker thread has.
    fn capture(&self) -> Option<Snapshot>;
}

/// Restores a captured context around a callback.
///
/// Implementations must revert to the previous context when `f` returns or
/// unwinds.
pub trait Restore: Send + Sync + 'static {
    /// Installs the captured context, calls `f` exactly once, then puts
    /// back the context that was active before.
    ///
    /// The previous context must also be restored when `f` unwinds, which
    /// is easiest with a drop guard.
    fn run(&self, f: &mut dyn FnMut());
}

/// A cheap, cloneable point-in-time capture of an ambient context.
#[derive(Clone)]
pub struct Snapshot {
    restore: Arc<dyn Restore>,
}

impl Snapshot {
    /// Wraps a custom [`Restore`] implementation.
    pub fn new<R: Restore>(restore: R) -> Self {
        Self {
            restore: Arc::new(restore),
        }
    }

    /// Runs `f` with this snapshot installed as the current context.
    pub fn run_within<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut f = Some(f);
        let mut out = None;

        self.restore.run(&mut || {
            if let Some(f) = f.take() {
                out = Some(f());
            }
        });

        match out {
            Some(out) => out,
            None => panic!("context restore did not invoke the callback"),
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot").finish_non_exhaustive()
    }
}

/// Provider that never captures a context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

impl AmbientContext for NoContext {
    fn capture(&self) -> Option<Snapshot> {
        None
    }
}

/// Provider backed by the thread-local frame managed by [`scope`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalContext;

impl AmbientContext for ThreadLocalContext {
    fn capture(&self) -> Option<Snapshot> {
        CURRENT_FRAME
            .with(|cell| cell.borrow().clone())
            .map(|frame| Snapshot::new(FrameSnapshot(frame)))
    }
}

type Value = Arc<dyn Any + Send + Sync>;

/// Immutable set of context values, one per type.
struct Frame {
    values: HashMap<TypeId, Value>,
}

thread_local! {
    /// Frame active on the current thread, if any.
    static CURRENT_FRAME: RefCell<Option<Arc<Frame>>> = const { RefCell::new(None) };
}

/// Installs `frame` and puts the previous one back when dropped.
struct Enter {
    prev: Option<Arc<Frame>>,
}

impl Enter {
    fn new(frame: Option<Arc<Frame>>) -> Self {
        let prev = CURRENT_FRAME.with(|cell| cell.replace(frame));
        Self { prev }
    }
}

impl Drop for Enter {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_FRAME.with(|cell| {
            cell.replace(prev);
        });
    }
}

struct FrameSnapshot(Arc<Frame>);

impl Restore for FrameSnapshot {
    fn run(&self, f: &mut dyn FnMut()) {
        let _enter = Enter::new(Some(self.0.clone()));
        f();
    }
}

/// Runs `f` with `value` added to the current thread's ambient context.
///
/// A value of the same type set by an outer scope is shadowed until `f`
/// returns. Work enqueued or continuations registered inside `f` observe
/// the value when they run.
pub fn scope<T, R>(value: T, f: impl FnOnce() -> R) -> R
where
    T: Any + Send + Sync,
{
    let mut values = CURRENT_FRAME
        .with(|cell| cell.borrow().as_ref().map(|frame| frame.values.clone()))
        .unwrap_or_default();

    values.insert(TypeId::of::<T>(), Arc::new(value));

    let _enter = Enter::new(Some(Arc::new(Frame { values })));
    f()
}

/// Returns the value of type `T` in the current ambient context.
pub fn get<T>() -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    let value = CURRENT_FRAME.with(|cell| {
        cell.borrow()
            .as_ref()
            .and_then(|frame| frame.values.get(&TypeId::of::<T>()).cloned())
    })?;

    value.downcast::<T>().ok()
}

/// Runs `f` with an empty ambient context on the current thread.
pub fn suppress<R>(f: impl FnOnce() -> R) -> R {
    let _enter = Enter::new(None);
    f()
}
