use std::thread;
use std::time::{Duration, Instant};

use partq::prelude::*;

fn slow_source(len: u32) -> Select<ArraySource<u32>, u32> {
    Select::new(ArraySource::new((0..len).collect::<Vec<_>>()), |x| {
        thread::sleep(Duration::from_micros(500));
        x
    })
}

fn cancel_after(source: &CancellationSource, delay: Duration) -> thread::JoinHandle<()> {
    let source = source.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        source.cancel();
    })
}

#[test]
fn test_pipelined_query_cancels_promptly() {
    let user = CancellationSource::new();
    let exec = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(4))
        .unwrap()
        .with_cancellation(user.token());
    let canceller = cancel_after(&user, Duration::from_millis(20));
    let started = Instant::now();
    let result = exec.to_vec(&slow_source(100_000));
    canceller.join().unwrap();
    assert_eq!(result.unwrap_err(), QueryError::Canceled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_last_cancels_while_partitions_scan() {
    let user = CancellationSource::new();
    let exec = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(3))
        .unwrap()
        .with_cancellation(user.token());
    let canceller = cancel_after(&user, Duration::from_millis(20));
    let started = Instant::now();
    let result = exec.last(&Last::new(slow_source(100_000)));
    canceller.join().unwrap();
    assert_eq!(result.unwrap_err(), QueryError::Canceled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_pre_canceled_query_does_not_produce() {
    let user = CancellationSource::new();
    user.cancel();
    let exec = QueryExecutor::default().with_cancellation(user.token());
    let op = ElementAt::new(ArraySource::new((0..10_000u32).collect::<Vec<_>>()), 9_000);
    assert_eq!(exec.element_at(&op).unwrap_err(), QueryError::Canceled);
}

#[test]
fn test_failing_predicate_in_last_does_not_deadlock() {
    // Partition 0 panics; partition 1 holds a candidate and waits on the
    // barrier. The panic must still release it.
    let source = PartitionedSource::new(
        vec![vec![(1, 0usize), (2, 1)], vec![(3, 2), (4, 3)]],
        OrdinalIndexState::Correct,
    );
    let op = Last::with_predicate(source, |x: &i32| {
        if *x == 2 {
            panic!("predicate failed");
        }
        true
    });
    let started = Instant::now();
    let err = QueryExecutor::default().last(&op).unwrap_err();
    assert!(matches!(err, QueryError::TaskFailed { ref message, .. } if message == "predicate failed"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_executor_is_reusable_after_failure() {
    let exec = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(2)).unwrap();
    let failing = Select::new(ArraySource::new(vec![1, 2, 3]), |x: i32| {
        if x == 2 {
            panic!("bad element");
        }
        x
    });
    assert!(exec.to_vec(&failing).is_err());
    // A fresh internal cancellation source per execution.
    let mut ok = exec.to_vec(&ArraySource::new(vec![1, 2, 3])).unwrap();
    ok.sort_unstable();
    assert_eq!(ok, vec![1, 2, 3]);
}
