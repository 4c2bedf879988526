#![forbid(unsafe_code)]
//! partq-operators: partition-aware operators.
//!
//! Design intent:
//! - Operators are opened bottom-up: `open` opens the child, then
//!   `wrap_partitioned_stream` turns the child's partitioned stream into this
//!   operator's stream.
//! - Each operator declares the `OrdinalIndexState` it needs from its child
//!   and the one it produces. When the child falls short, the operator
//!   inserts a premature merge (see `premature`).
//! - No operator spawns work itself; spooling goes through `partq-sched`.

pub mod operator;
pub mod premature;
pub mod source;

pub mod element_at;
pub mod for_all;
pub mod indexed_where;
pub mod last;
pub mod select;

pub use element_at::ElementAt;
pub use for_all::ForAll;
pub use indexed_where::IndexedWhere;
pub use last::Last;
pub use operator::{
    CancellableIter, IndexedResults, QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator,
    UnaryQueryOperatorResults,
};
pub use premature::{execute_and_collect_results, ListQueryResults, PrematureMerge};
pub use select::Select;
pub use source::{ArraySource, PartitionedSource};
