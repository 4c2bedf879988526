//! Partitioned streams and per-partition pull cursors.
//!
//! A query over P partitions is represented as P enumerators that all yield
//! `(element, key)` pairs of the same key type and share one key comparer.
//! The stream also carries the `OrdinalIndexState` its producer declared.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::ordinal::OrdinalIndexState;

/// Single-partition pull cursor.
///
/// Invariants:
/// - once `move_next` returns `Ok(None)`, every later call also returns
///   `Ok(None)`;
/// - `dispose` is idempotent and releases the underlying source cursor.
pub trait QueryOperatorEnumerator<T, K>: Send {
    fn move_next(&mut self) -> Result<Option<(T, K)>>;

    fn dispose(&mut self) {}
}

pub type BoxedEnumerator<T, K> = Box<dyn QueryOperatorEnumerator<T, K>>;

pub type KeyComparer<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

pub fn default_comparer<K: Ord>() -> KeyComparer<K> {
    Arc::new(|a: &K, b: &K| a.cmp(b))
}

pub struct PartitionedStream<T, K> {
    partitions: Vec<BoxedEnumerator<T, K>>,
    comparer: KeyComparer<K>,
    state: OrdinalIndexState,
}

impl<T, K> PartitionedStream<T, K> {
    pub fn new(
        partitions: Vec<BoxedEnumerator<T, K>>,
        comparer: KeyComparer<K>,
        state: OrdinalIndexState,
    ) -> Self {
        Self {
            partitions,
            comparer,
            state,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn key_comparer(&self) -> KeyComparer<K> {
        Arc::clone(&self.comparer)
    }

    pub fn ordinal_index_state(&self) -> OrdinalIndexState {
        self.state
    }

    pub fn into_partitions(self) -> Vec<BoxedEnumerator<T, K>> {
        self.partitions
    }

    pub fn into_parts(self) -> (Vec<BoxedEnumerator<T, K>>, KeyComparer<K>, OrdinalIndexState) {
        (self.partitions, self.comparer, self.state)
    }
}

impl<T, K> fmt::Debug for PartitionedStream<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedStream")
            .field("partitions", &self.partitions.len())
            .field("state", &self.state)
            .finish()
    }
}
