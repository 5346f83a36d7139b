use tether::{Pool, PoolBuilder, Task, TaskError};

use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn pool(n: usize) -> Pool {
    PoolBuilder::new()
        .worker_threads(n)
        .build()
        .expect("pool should start")
}

/// Returns once every continuation queued so far on a single-worker pool
/// has run.
fn drain(pool: &Pool) {
    pool.run(|| Ok(())).wait().unwrap();
}

/// A permutation of `0..n` for some `n` in `1..8`.
fn completion_order() -> impl Strategy<Value = Vec<usize>> {
    (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

/// A completion order paired with which inputs fail.
fn completion_order_with_failures() -> impl Strategy<Value = (Vec<usize>, Vec<bool>)> {
    completion_order().prop_flat_map(|order| {
        let n = order.len();
        (Just(order), prop::collection::vec(any::<bool>(), n))
    })
}

/// Sequence length and the index of the element that fails.
fn failing_index() -> impl Strategy<Value = (usize, usize)> {
    (1usize..10).prop_flat_map(|k| (Just(k), 0..k))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_when_all_completes_only_after_last_input(order in completion_order()) {
        let pool = pool(1);
        let inputs: Vec<Task> = order.iter().map(|_| Task::new(&pool)).collect();

        let all = pool.when_all(inputs.clone());

        let (last, rest) = order.split_last().unwrap();
        for &index in rest {
            inputs[index].set_result();
        }
        drain(&pool);

        prop_assert!(!all.is_completed());

        inputs[*last].set_result();

        prop_assert!(all.wait().is_ok());
    }

    #[test]
    fn prop_when_all_reports_first_failure_in_completion_order(
        (order, failing) in completion_order_with_failures()
    ) {
        let pool = pool(1);
        let inputs: Vec<Task> = order.iter().map(|_| Task::new(&pool)).collect();

        let all = pool.when_all(inputs.clone());

        for &index in &order {
            if failing[index] {
                inputs[index].set_error(format!("input {index}"));
            } else {
                inputs[index].set_result();
            }
        }

        let expected = order
            .iter()
            .find(|&&index| failing[index])
            .map(|index| format!("input {index}"));

        let outcome = all.wait().err().map(|error| error.to_string());
        prop_assert_eq!(outcome, expected);
    }

    #[test]
    fn prop_drive_stops_at_failing_element((k, j) in failing_index()) {
        let pool = pool(2);
        let pulled = Arc::new(AtomicUsize::new(0));

        let producer = pool.clone();
        let count = pulled.clone();
        let sequence = (0..k).map(move |i| {
            count.fetch_add(1, Ordering::SeqCst);
            if i == j {
                producer.run(move || Err(TaskError::msg(format!("fail {i}"))))
            } else {
                producer.run(|| Ok(()))
            }
        });

        let error = pool.drive(sequence).wait().unwrap_err();

        prop_assert_eq!(error.to_string(), format!("fail {j}"));
        prop_assert_eq!(pulled.load(Ordering::SeqCst), j + 1);
    }
}
