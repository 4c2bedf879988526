#![forbid(unsafe_code)]
//! partq: a partition-based parallel query engine.
//!
//! Facade over the workspace crates:
//! - `partq-core`: ordinal states, config, errors, cancellation, sync cells;
//! - `partq-sched`: task scheduling, task groups, channels, spooling;
//! - `partq-operators`: the operator contract and the operators;
//! - `partq-exec`: merge enumerators and the `QueryExecutor`.
//!
//! ```no_run
//! use partq::prelude::*;
//!
//! let executor = QueryExecutor::new(QueryConfig::default().with_degree_of_parallelism(4))?;
//! let source = ArraySource::new((0..1_000).collect::<Vec<u64>>());
//! let squares = Select::new(source, |x| x * x);
//! assert_eq!(executor.element_at(&ElementAt::new(squares, 10))?, 100);
//! # Ok::<(), partq::QueryError>(())
//! ```

pub use partq_core;
pub use partq_exec;
pub use partq_operators;
pub use partq_sched;

pub use partq_core::error::{QueryError, Result};

pub mod prelude {
    pub use partq_core::prelude::*;
    pub use partq_exec::{QueryEnumerator, QueryExecutor};
    pub use partq_operators::{
        ArraySource, ElementAt, ForAll, IndexedResults, IndexedWhere, Last, PartitionedSource, QueryOperator,
        QueryResults, Select, UnaryQueryOperator,
    };
    pub use partq_sched::{QuerySettings, TaskScheduler, ThreadScheduler};
}
