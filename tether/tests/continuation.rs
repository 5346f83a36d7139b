use tether::{Pool, PoolBuilder, Task, TaskError};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn pool(n: usize) -> Pool {
    PoolBuilder::new()
        .worker_threads(n)
        .build()
        .expect("pool should start")
}

#[test]
fn test_chain_runs_stages_in_order() {
    let pool = pool(4);
    let order = Arc::new(Mutex::new(Vec::new()));

    let (a, b, c) = (order.clone(), order.clone(), order.clone());

    let task = pool
        .run(move || {
            a.lock().unwrap().push("a");
            Ok(())
        })
        .continue_with(move || {
            b.lock().unwrap().push("b");
            Ok(())
        })
        .continue_with(move || {
            c.lock().unwrap().push("c");
            Ok(())
        });

    assert!(task.wait().is_ok());
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_continue_with_returns_before_parent_completes() {
    let pool = pool(2);
    let root = Task::new(&pool);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    let child = root.continue_with(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(!child.is_completed());
    assert!(!ran.load(Ordering::SeqCst));

    root.set_result();

    assert!(child.wait().is_ok());
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_action_error_fails_child() {
    let pool = pool(2);

    let task = Task::completed(&pool).continue_with(|| Err("stage failed".into()));

    assert_eq!(task.wait().unwrap_err().to_string(), "stage failed");
}

#[test]
fn test_action_panic_fails_child() {
    let pool = pool(1);

    let task = Task::completed(&pool).continue_with(|| panic!("kaboom"));

    let error = task.wait().unwrap_err();
    assert!(error.is_panic());
    assert_eq!(error.to_string(), "task panicked: kaboom");

    // The worker survived the panic.
    assert!(pool.run(|| Ok(())).wait().is_ok());
}

#[test]
fn test_failure_short_circuits_later_stages() {
    let pool = pool(4);
    let later_runs = Arc::new(AtomicUsize::new(0));

    let (b, c) = (later_runs.clone(), later_runs.clone());

    let task = pool
        .run(|| Err(TaskError::msg("stage one")))
        .continue_with(move || {
            b.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .continue_with(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    assert_eq!(task.wait().unwrap_err().to_string(), "stage one");
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_middle_failure_reaches_the_end() {
    let pool = pool(4);
    let last_ran = Arc::new(AtomicBool::new(false));

    let flag = last_ran.clone();
    let task = pool
        .run(|| Ok(()))
        .continue_with(|| Err("stage two".into()))
        .continue_with(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

    assert_eq!(task.wait().unwrap_err().to_string(), "stage two");
    assert!(!last_ran.load(Ordering::SeqCst));
}

#[test]
fn test_grouping_does_not_change_outcome() {
    let pool = pool(4);

    // (A -> B) -> C
    let left = pool
        .run(|| Ok(()))
        .continue_with(|| Err("b".into()))
        .continue_with(|| Ok(()));

    // A -> (B -> C)
    let inner_pool = pool.clone();
    let right = pool.run(|| Ok(())).continue_with(move || {
        inner_pool
            .run(|| Err("b".into()))
            .continue_with(|| Ok(()))
            .wait()
    });

    let left = left.wait().unwrap_err();
    let right = right.wait().unwrap_err();

    assert_eq!(left.to_string(), right.to_string());
}

#[test]
fn test_parent_error_is_visible_to_raw_continuation() {
    let pool = pool(2);
    let root = Task::new(&pool);
    let (transmitter, receiver) = std::sync::mpsc::channel();

    let observed = root.clone();
    root.on_completed(move || {
        let message = observed.error().map(|e| e.to_string());
        transmitter.send(message).unwrap();
    });

    root.set_error("observed");

    assert_eq!(receiver.recv().unwrap().as_deref(), Some("observed"));
}

#[test]
fn test_deep_chain_of_completed_tasks() {
    let pool = pool(2);
    let count = Arc::new(AtomicUsize::new(0));

    let mut task = Task::completed(&pool);
    for _ in 0..10_000 {
        let count = count.clone();
        task = task.continue_with(move || {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
    }

    assert!(task.wait().is_ok());
    assert_eq!(count.load(Ordering::Relaxed), 10_000);
}
