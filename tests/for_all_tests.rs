use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use partq::prelude::*;

#[test]
fn test_for_all_visits_each_element_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let source = ArraySource::new((0..5_000usize).collect::<Vec<_>>());
    let op = ForAll::new(source, move |x| sink.lock().unwrap().push(x));

    let exec = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(6)).unwrap();
    exec.for_all(&op).unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..5_000).collect::<Vec<_>>());
}

#[test]
fn test_for_all_yields_nothing_when_enumerated() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let op = ForAll::new(ArraySource::new(vec![1, 2, 3]), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let exec = QueryExecutor::default();
    assert!(exec.to_vec(&op).unwrap().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn test_for_all_is_not_sequential() {
    let op = ForAll::new(ArraySource::new(vec![1]), |_| {});
    assert_eq!(
        op.as_sequential_query(&CancellationToken::none()).err(),
        Some(QueryError::SequentialNotSupported("for_all"))
    );
}

#[test]
fn test_for_all_reports_action_panic() {
    let op = ForAll::new(ArraySource::new((0..100).collect::<Vec<i32>>()), |x| {
        if x == 42 {
            panic!("action failed on {x}");
        }
    });
    let exec = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(4)).unwrap();
    match exec.for_all(&op) {
        Err(QueryError::TaskFailed { message, .. }) => assert_eq!(message, "action failed on 42"),
        other => panic!("expected task failure, got {other:?}"),
    }
}
