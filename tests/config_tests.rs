use partq::prelude::*;

#[test]
fn test_config_from_env_overlays_defaults() {
    std::env::set_var("PARTQ_DEGREE_OF_PARALLELISM", "3");
    std::env::set_var("PARTQ_EXECUTION_MODE", "force_parallelism");
    std::env::set_var("PARTQ_MERGE_OPTIONS", "Fully_Buffered");
    std::env::set_var("PARTQ_BUFFER_CAPACITY", "not-a-number");
    std::env::set_var("PARTQ_CHUNK_SIZE", " 16 ");

    let cfg = QueryConfig::from_env();
    assert_eq!(cfg.degree_of_parallelism, 3);
    assert_eq!(cfg.execution_mode, ExecutionMode::ForceParallelism);
    assert_eq!(cfg.merge_options, MergeOptions::FullyBuffered);
    assert_eq!(cfg.bounded_buffer_capacity, QueryConfig::default().bounded_buffer_capacity);
    assert_eq!(cfg.chunk_size, 16);

    let exec = QueryExecutor::from_env().unwrap();
    assert_eq!(exec.settings().degree_of_parallelism(), 3);

    for name in [
        "PARTQ_DEGREE_OF_PARALLELISM",
        "PARTQ_EXECUTION_MODE",
        "PARTQ_MERGE_OPTIONS",
        "PARTQ_BUFFER_CAPACITY",
        "PARTQ_CHUNK_SIZE",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
fn test_executor_rejects_invalid_config() {
    let err = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(0)).unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
    let err = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(513)).unwrap_err();
    assert!(matches!(err, QueryError::Config(_)));
}

#[test]
fn test_config_serde_uses_snake_case() {
    let cfg = QueryConfig::default()
        .with_degree_of_parallelism(2)
        .with_merge_options(MergeOptions::NotBuffered);
    let json = serde_json::to_value(&cfg).unwrap();
    assert_eq!(json["merge_options"], "not_buffered");
    assert_eq!(json["execution_mode"], "default");
    let back: QueryConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, cfg);
}
