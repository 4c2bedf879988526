pub use crate::cancel::{CancellationSource, CancellationState, CancellationToken, POLL_INTERVAL};
pub use crate::config::{ExecutionMode, MergeOptions, QueryConfig};
pub use crate::error::{QueryError, Result};
pub use crate::id::QueryId;
pub use crate::ordinal::OrdinalIndexState;
pub use crate::stream::{
    default_comparer, BoxedEnumerator, KeyComparer, PartitionedStream, QueryOperatorEnumerator,
};
pub use crate::sync::{CountdownEvent, IntValueEvent, Shared, SharedFlag};
