use tether::context::{self, AmbientContext, NoContext, Restore, Snapshot};
use tether::{Pool, PoolBuilder, Task};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
struct Tag(&'static str);

#[derive(Debug, PartialEq, Eq)]
struct Depth(u32);

fn pool(n: usize) -> Pool {
    PoolBuilder::new()
        .worker_threads(n)
        .build()
        .expect("pool should start")
}

fn current_tag() -> Option<&'static str> {
    context::get::<Tag>().map(|tag| tag.0)
}

#[test]
fn test_scope_sets_and_reverts() {
    assert_eq!(current_tag(), None);

    context::scope(Tag("outer"), || {
        assert_eq!(current_tag(), Some("outer"));

        context::scope(Tag("inner"), || {
            assert_eq!(current_tag(), Some("inner"));
        });

        assert_eq!(current_tag(), Some("outer"));
    });

    assert_eq!(current_tag(), None);
}

#[test]
fn test_scope_keeps_values_of_other_types() {
    context::scope(Tag("kept"), || {
        context::scope(Depth(2), || {
            assert_eq!(current_tag(), Some("kept"));
            assert_eq!(context::get::<Depth>().as_deref(), Some(&Depth(2)));
        });
    });
}

#[test]
fn test_suppress_hides_values() {
    context::scope(Tag("hidden"), || {
        context::suppress(|| assert_eq!(current_tag(), None));
        assert_eq!(current_tag(), Some("hidden"));
    });
}

#[test]
fn test_run_sees_context_of_caller() {
    let pool = pool(2);
    let (transmitter, receiver) = mpsc::channel();

    let task = context::scope(Tag("request-42"), || {
        pool.run(move || {
            transmitter.send(current_tag()).unwrap();
            Ok(())
        })
    });

    assert!(task.wait().is_ok());
    assert_eq!(receiver.recv().unwrap(), Some("request-42"));
}

#[test]
fn test_continuation_sees_context_of_registration() {
    let pool = pool(2);
    let task = Task::new(&pool);
    let (transmitter, receiver) = mpsc::channel();

    context::scope(Tag("registered"), || {
        task.on_completed(move || transmitter.send(current_tag()).unwrap());
    });

    context::scope(Tag("completed"), || task.set_result());

    let seen = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen, Some("registered"));
}

#[test]
fn test_chain_carries_context_across_hops() {
    let pool = pool(4);
    let (transmitter, receiver) = mpsc::channel();

    let task = context::scope(Tag("chain"), || {
        let first = transmitter.clone();
        pool.run(move || {
            first.send(current_tag()).unwrap();
            Ok(())
        })
        .continue_with(move || {
            transmitter.send(current_tag()).unwrap();
            Ok(())
        })
    });

    assert!(task.wait().is_ok());

    let seen: Vec<_> = receiver.iter().collect();
    assert_eq!(seen, vec![Some("chain"), Some("chain")]);
}

#[test]
fn test_worker_context_restored_after_callback() {
    let pool = pool(1);
    let (transmitter, receiver) = mpsc::channel();

    context::scope(Tag("leaky"), || pool.enqueue(|| {}));

    pool.enqueue(move || transmitter.send(current_tag()).unwrap());

    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), None);
}

#[test]
fn test_worker_context_restored_after_panic() {
    let pool = pool(1);
    let (transmitter, receiver) = mpsc::channel();

    context::scope(Tag("panicking"), || {
        pool.enqueue(|| panic!("callback failed inside a context"))
    });

    pool.enqueue(move || transmitter.send(current_tag()).unwrap());

    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), None);
}

#[test]
fn test_no_context_provider_disables_propagation() {
    let pool = PoolBuilder::new()
        .worker_threads(1)
        .context(NoContext)
        .build()
        .unwrap();
    let (transmitter, receiver) = mpsc::channel();

    let task = context::scope(Tag("dropped"), || {
        pool.run(move || {
            transmitter.send(current_tag()).unwrap();
            Ok(())
        })
    });

    assert!(task.wait().is_ok());
    assert_eq!(receiver.recv().unwrap(), None);
}

struct Counting {
    captures: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
}

struct CountingRestore(Arc<AtomicUsize>);

impl Restore for CountingRestore {
    fn run(&self, f: &mut dyn FnMut()) {
        self.0.fetch_add(1, Ordering::SeqCst);
        f();
    }
}

impl AmbientContext for Counting {
    fn capture(&self) -> Option<Snapshot> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Some(Snapshot::new(CountingRestore(self.restores.clone())))
    }
}

#[test]
fn test_custom_provider_is_used_for_every_hop() {
    let captures = Arc::new(AtomicUsize::new(0));
    let restores = Arc::new(AtomicUsize::new(0));

    let pool = PoolBuilder::new()
        .worker_threads(2)
        .context(Counting {
            captures: captures.clone(),
            restores: restores.clone(),
        })
        .build()
        .unwrap();

    let root = Task::new(&pool);
    let (transmitter, receiver) = mpsc::channel();

    root.on_completed(move || transmitter.send(()).unwrap());
    root.set_result();

    receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    // Captured once at registration, restored once on the worker; the
    // completer does not capture.
    assert_eq!(captures.load(Ordering::SeqCst), 1);
    assert_eq!(restores.load(Ordering::SeqCst), 1);

    let (transmitter, receiver) = mpsc::channel();
    pool.enqueue(move || transmitter.send(()).unwrap());
    receiver.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(captures.load(Ordering::SeqCst), 2);
    assert_eq!(restores.load(Ordering::SeqCst), 2);
}

#[test]
fn test_snapshot_run_within_returns_value() {
    let snapshot = context::scope(Tag("captured"), || {
        tether::context::ThreadLocalContext.capture()
    })
    .expect("a frame is active inside scope");

    assert_eq!(current_tag(), None);
    assert_eq!(snapshot.run_within(current_tag), Some("captured"));
    assert_eq!(current_tag(), None);
}
