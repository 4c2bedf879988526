use partq::prelude::*;

fn executor(dop: usize, options: MergeOptions) -> QueryExecutor {
    QueryExecutor::new(
        QueryConfig::default()
            .with_degree_of_parallelism(dop)
            .with_merge_options(options),
    )
    .unwrap()
}

#[test]
fn test_pipelined_merge_yields_a_permutation() {
    let source = ArraySource::new((0..20_000u32).collect::<Vec<_>>());
    let op = Select::new(source, |x| x + 1);
    for options in [MergeOptions::NotBuffered, MergeOptions::AutoBuffered] {
        for dop in [1, 2, 5, 16] {
            let mut out = executor(dop, options).to_vec(&op).unwrap();
            assert_eq!(out.len(), 20_000);
            out.sort_unstable();
            assert_eq!(out, (1..=20_000).collect::<Vec<_>>());
        }
    }
}

#[test]
fn test_small_channels_apply_backpressure_without_loss() {
    let mut config = QueryConfig::default().with_degree_of_parallelism(4);
    config.bounded_buffer_capacity = 1;
    config.chunk_size = 2;
    let exec = QueryExecutor::new(config).unwrap();
    let op = Select::new(ArraySource::new((0..5_000u64).collect::<Vec<_>>()), |x| x);
    let total: u64 = exec.to_vec(&op).unwrap().into_iter().sum();
    assert_eq!(total, (0..5_000u64).sum::<u64>());
}

#[test]
fn test_fully_buffered_keeps_partition_order() {
    let source = ArraySource::new((0..100u32).collect::<Vec<_>>());
    let out = executor(4, MergeOptions::FullyBuffered).to_vec(&source).unwrap();
    assert_eq!(out, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_ordered_output_is_key_sorted_under_any_options() {
    let source = PartitionedSource::new(
        vec![vec![("d", 3usize), ("a", 0)], vec![("c", 2), ("b", 1)]],
        OrdinalIndexState::Shuffled,
    )
    .as_ordered();
    for options in [MergeOptions::NotBuffered, MergeOptions::AutoBuffered, MergeOptions::FullyBuffered] {
        assert_eq!(executor(2, options).to_vec(&source).unwrap(), vec!["a", "b", "c", "d"]);
    }
}

#[test]
fn test_enumerator_contract() {
    let source = ArraySource::new(vec![5]);
    let mut e = executor(3, MergeOptions::AutoBuffered).enumerate(&source).unwrap();
    assert_eq!(e.current(), Err(QueryError::EnumerationNotStarted));
    assert!(e.move_next().unwrap());
    assert_eq!(e.current(), Ok(&5));
    assert!(!e.move_next().unwrap());
    assert_eq!(e.current(), Err(QueryError::EnumerationFinished));
}

#[test]
fn test_dropping_enumerator_early_stops_producers() {
    let mut config = QueryConfig::default().with_degree_of_parallelism(4);
    config.bounded_buffer_capacity = 1;
    config.chunk_size = 1;
    let exec = QueryExecutor::new(config).unwrap();
    let source = ArraySource::new((0..1_000_000u32).collect::<Vec<_>>());
    let mut e = exec.enumerate(&source).unwrap();
    assert!(e.move_next().unwrap());
    // Drop must cancel, unblock and join every producer.
    drop(e);
}

#[test]
fn test_task_failure_surfaces_at_end_of_pipelined_enumeration() {
    let op = Select::new(ArraySource::new((0..1_000i32).collect::<Vec<_>>()), |x| {
        if x == 999 {
            panic!("selector failed");
        }
        x
    });
    let err = executor(4, MergeOptions::AutoBuffered).to_vec(&op).unwrap_err();
    assert!(matches!(err, QueryError::TaskFailed { ref message, .. } if message == "selector failed"));
}

#[test]
fn test_empty_source_under_every_shape() {
    let source = ArraySource::<u8>::new(Vec::new());
    for options in [MergeOptions::NotBuffered, MergeOptions::AutoBuffered, MergeOptions::FullyBuffered] {
        assert!(executor(4, options).to_vec(&source).unwrap().is_empty());
    }
}
