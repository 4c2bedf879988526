use partq::prelude::*;

fn executor(dop: usize) -> QueryExecutor {
    QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(dop)).unwrap()
}

/// Partitions {1,2,3} keyed 0,2,4 and {4,5} keyed 6,8: increasing keys with gaps.
fn gapped_source() -> PartitionedSource<u32, usize> {
    PartitionedSource::new(
        vec![vec![(1, 0), (2, 2), (3, 4)], vec![(4, 6), (5, 8)]],
        OrdinalIndexState::Increasing,
    )
}

#[test]
fn test_element_at_over_indexible_source_runs_in_parallel() {
    let source = ArraySource::new((0..1_000u64).collect::<Vec<_>>());
    let op = ElementAt::new(Select::new(source, |x| x * 2), 123);
    assert!(!op.premature_merge());
    assert!(!op.limits_parallelism());
    for dop in [1, 2, 3, 8] {
        assert_eq!(executor(dop).element_at(&op).unwrap(), 246);
    }
}

#[test]
fn test_element_at_repairs_increasing_keys() {
    let op = ElementAt::new(gapped_source(), 3);
    assert!(op.premature_merge());
    assert!(op.limits_parallelism());

    // Default mode walks the child sequentially.
    assert_eq!(executor(4).element_at(&op).unwrap(), 4);

    // Forced parallelism goes through the premature merge instead.
    let forced = QueryExecutor::new(
        QueryConfig::default()
            .with_degree_of_parallelism(4)
            .with_execution_mode(ExecutionMode::ForceParallelism),
    )
    .unwrap();
    assert_eq!(forced.element_at(&op).unwrap(), 4);
}

#[test]
fn test_element_at_shuffled_keys_merge_without_limiting() {
    let source = PartitionedSource::new(
        vec![vec![('c', 7), ('a', 1)], vec![('b', 3)]],
        OrdinalIndexState::Shuffled,
    )
    .as_ordered();
    let op = ElementAt::new(source, 0);
    assert!(op.premature_merge());
    assert!(!op.limits_parallelism());
    assert_eq!(executor(2).element_at(&op).unwrap(), 'a');
    assert_eq!(executor(2).element_at(&ElementAt::new(op.child().clone(), 2)).unwrap(), 'c');
}

#[test]
fn test_element_at_out_of_range() {
    let source = ArraySource::new(vec![1, 2, 3]);
    let op = ElementAt::new(source, 3);
    let exec = executor(2);
    assert_eq!(exec.element_at_or_default(&op).unwrap(), None);
    assert_eq!(
        exec.element_at(&op).unwrap_err(),
        QueryError::IndexOutOfRange { index: 3 }
    );

    let sequential = ElementAt::new(gapped_source(), 10);
    assert_eq!(exec.element_at_or_default(&sequential).unwrap(), None);
}

#[test]
fn test_element_at_empty_source() {
    let source = ArraySource::<i32>::new(Vec::new());
    assert_eq!(
        executor(4).element_at_or_default(&ElementAt::new(source, 0)).unwrap(),
        None
    );
}

#[test]
fn test_element_at_cannot_run_sequentially() {
    let op = ElementAt::new(ArraySource::new(vec![1]), 0);
    assert_eq!(
        op.as_sequential_query(&CancellationToken::none()).err(),
        Some(QueryError::SequentialNotSupported("element_at"))
    );
}

#[test]
fn test_element_at_unordered_interleaved_keys_agree_across_modes() {
    // Unordered: both plans read partitions in index order, not key order.
    let source = PartitionedSource::new(
        vec![vec![(10, 0usize), (30, 2)], vec![(20, 1), (40, 3)]],
        OrdinalIndexState::Increasing,
    );
    let op = ElementAt::new(source.clone(), 1);
    assert!(op.limits_parallelism());
    let forced = QueryExecutor::new(
        QueryConfig::default()
            .with_degree_of_parallelism(2)
            .with_execution_mode(ExecutionMode::ForceParallelism),
    )
    .unwrap();
    assert_eq!(executor(2).element_at(&op).unwrap(), 30);
    assert_eq!(forced.element_at(&op).unwrap(), 30);

    // Ordered: both plans read in key order.
    let op = ElementAt::new(source.as_ordered(), 1);
    assert_eq!(executor(2).element_at(&op).unwrap(), 20);
    assert_eq!(forced.element_at(&op).unwrap(), 20);
}
