//! Premature merge.
//!
//! An operator that needs ordinal keys of at least some quality but gets a
//! worse stream from its child drains the child completely, rebuilds the
//! order, and republishes the buffer with fresh `usize` keys equal to buffer
//! positions. The result is `Indexible`.

use std::fmt;
use std::vec;

use partq_core::error::Result;
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{default_comparer, BoxedEnumerator, PartitionedStream, QueryOperatorEnumerator};
use partq_sched::settings::QuerySettings;
use partq_sched::spooling::spool_stop_and_go;
use partq_sched::task::QueryTaskGroupState;

use crate::operator::QueryResults;

/// Outcome of comparing a child's ordinal state with what an operator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrematureMerge {
    pub required: bool,
    pub limits_parallelism: bool,
}

impl PrematureMerge {
    pub fn decide(child_state: OrdinalIndexState, required: OrdinalIndexState) -> Self {
        if child_state.is_worse_than(required) {
            Self {
                required: true,
                // Only a fully unordered child can be repaired without
                // serializing the work.
                limits_parallelism: child_state != OrdinalIndexState::Shuffled,
            }
        } else {
            Self {
                required: false,
                limits_parallelism: false,
            }
        }
    }
}

/// Drain every partition of `stream` in parallel and collect the elements
/// into one buffer: in key order when `output_ordered`, otherwise partition
/// by partition.
pub fn execute_and_collect_results<T, K>(
    stream: PartitionedStream<T, K>,
    output_ordered: bool,
    prefer_striping: bool,
    settings: &QuerySettings,
    operator: &'static str,
) -> Result<ListQueryResults<T>>
where
    T: Send + 'static,
    K: Send + 'static,
{
    let partition_count = stream.partition_count();
    let comparer = stream.key_comparer();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        query = %settings.query_id(),
        operator,
        child_state = %stream.ordinal_index_state(),
        partitions = partition_count,
        "premature merge"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = operator;

    let group = QueryTaskGroupState::new(settings.cancellation().clone(), settings.query_id());
    let channels = spool_stop_and_go(&group, settings, stream)?;
    group.query_end(false)?;

    let mut pairs: Vec<(T, K)> = Vec::new();
    for channel in &channels {
        pairs.extend(channel.take_all());
    }
    if output_ordered {
        pairs.sort_by(|a, b| comparer(&a.1, &b.1));
    }
    let items = pairs.into_iter().map(|(item, _)| item).collect();
    Ok(ListQueryResults::new(items, partition_count, prefer_striping))
}

/// A fully materialized buffer republished as an `Indexible` stream.
pub struct ListQueryResults<T> {
    items: Vec<T>,
    partition_count: usize,
    prefer_striping: bool,
}

impl<T> ListQueryResults<T> {
    pub fn new(items: Vec<T>, partition_count: usize, prefer_striping: bool) -> Self {
        Self {
            items,
            partition_count: partition_count.max(1),
            prefer_striping,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }
}

impl<T: Send + 'static> ListQueryResults<T> {
    pub fn into_partitioned_stream(self) -> PartitionedStream<T, usize> {
        let count = self.partition_count;
        let mut slices: Vec<Vec<(T, usize)>> = (0..count).map(|_| Vec::new()).collect();
        if self.prefer_striping {
            for (index, item) in self.items.into_iter().enumerate() {
                slices[index % count].push((item, index));
            }
        } else {
            let total = self.items.len();
            let mut partition = 0;
            let mut end = contiguous_bound(total, count, 0);
            for (index, item) in self.items.into_iter().enumerate() {
                while index >= end {
                    partition += 1;
                    end = contiguous_bound(total, count, partition);
                }
                slices[partition].push((item, index));
            }
        }
        let partitions = slices
            .into_iter()
            .map(|slice| Box::new(ListPartitionEnumerator { items: slice.into_iter() }) as BoxedEnumerator<T, usize>)
            .collect();
        PartitionedStream::new(partitions, default_comparer(), OrdinalIndexState::Indexible)
    }
}

impl<T: Send + 'static> QueryResults<T, usize> for ListQueryResults<T> {
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<T, usize>> {
        Ok((*self).into_partitioned_stream())
    }
}

impl<T> fmt::Debug for ListQueryResults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListQueryResults")
            .field("len", &self.items.len())
            .field("partitions", &self.partition_count)
            .field("striped", &self.prefer_striping)
            .finish()
    }
}

/// Exclusive end of partition `partition` when `total` items are split into
/// `count` contiguous ranges whose sizes differ by at most one.
pub(crate) fn contiguous_bound(total: usize, count: usize, partition: usize) -> usize {
    let base = total / count;
    let extra = total % count;
    let upto = partition + 1;
    upto * base + upto.min(extra)
}

struct ListPartitionEnumerator<T> {
    items: vec::IntoIter<(T, usize)>,
}

impl<T: Send> QueryOperatorEnumerator<T, usize> for ListPartitionEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<(T, usize)>> {
        Ok(self.items.next())
    }

    fn dispose(&mut self) {
        self.items = Vec::new().into_iter();
    }
}
