//! Leaf operators.
//!
//! `ArraySource` splits an in-memory slice into `degree_of_parallelism`
//! partitions keyed by element position. `PartitionedSource` takes slices an
//! external partitioner already produced, together with the key comparer and
//! ordinal state it vouches for.

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::CancellationToken;
use partq_core::error::Result;
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{default_comparer, BoxedEnumerator, KeyComparer, PartitionedStream, QueryOperatorEnumerator};
use partq_sched::settings::QuerySettings;

use crate::operator::{IndexedResults, QueryOperator, QueryResults, SequentialQuery};
use crate::premature::contiguous_bound;

pub struct ArraySource<T> {
    data: Arc<[T]>,
    ordered: bool,
}

impl<T> ArraySource<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self::from_shared(data.into())
    }

    pub fn from_shared(data: Arc<[T]>) -> Self {
        Self { data, ordered: false }
    }

    /// Require consumers to reassemble the output in position order.
    pub fn as_ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Clone for ArraySource<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            ordered: self.ordered,
        }
    }
}

impl<T> fmt::Debug for ArraySource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArraySource")
            .field("len", &self.data.len())
            .field("ordered", &self.ordered)
            .finish()
    }
}

impl<T> QueryOperator for ArraySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;
    type Key = usize;

    fn name(&self) -> &'static str {
        "array_source"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        OrdinalIndexState::Indexible
    }

    fn output_ordered(&self) -> bool {
        self.ordered
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<T, usize>>> {
        Ok(Box::new(ArrayQueryResults {
            data: Arc::clone(&self.data),
            partition_count: settings.degree_of_parallelism().max(1),
            prefer_striping,
        }))
    }

    fn as_sequential_query(&self, _token: &CancellationToken) -> Result<SequentialQuery<T>> {
        let data = Arc::clone(&self.data);
        Ok(Box::new((0..data.len()).map(move |i| Ok(data[i].clone()))))
    }

    fn limits_parallelism(&self) -> bool {
        false
    }
}

struct ArrayQueryResults<T> {
    data: Arc<[T]>,
    partition_count: usize,
    prefer_striping: bool,
}

impl<T> QueryResults<T, usize> for ArrayQueryResults<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<T, usize>> {
        let count = self.partition_count;
        let total = self.data.len();
        let partitions = (0..count)
            .map(|p| {
                let (next, end, step) = if self.prefer_striping {
                    (p, total, count)
                } else {
                    let start = if p == 0 { 0 } else { contiguous_bound(total, count, p - 1) };
                    (start, contiguous_bound(total, count, p), 1)
                };
                Box::new(ArrayPartitionEnumerator {
                    data: Arc::clone(&self.data),
                    next,
                    end,
                    step,
                }) as BoxedEnumerator<T, usize>
            })
            .collect();
        Ok(PartitionedStream::new(
            partitions,
            default_comparer(),
            OrdinalIndexState::Indexible,
        ))
    }

    fn indexed(&self) -> Option<Arc<dyn IndexedResults<T>>> {
        Some(Arc::new(ArrayIndexed {
            data: Arc::clone(&self.data),
        }))
    }
}

struct ArrayIndexed<T> {
    data: Arc<[T]>,
}

impl<T: Clone + Send + Sync> IndexedResults<T> for ArrayIndexed<T> {
    fn elements_count(&self) -> usize {
        self.data.len()
    }

    fn get_element(&self, index: usize) -> Option<T> {
        self.data.get(index).cloned()
    }
}

struct ArrayPartitionEnumerator<T> {
    data: Arc<[T]>,
    next: usize,
    end: usize,
    step: usize,
}

impl<T: Clone + Send + Sync> QueryOperatorEnumerator<T, usize> for ArrayPartitionEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<(T, usize)>> {
        if self.next >= self.end {
            return Ok(None);
        }
        let index = self.next;
        self.next += self.step;
        Ok(Some((self.data[index].clone(), index)))
    }

    fn dispose(&mut self) {
        self.next = self.end;
    }
}

/// Pre-partitioned input with caller-declared key order.
pub struct PartitionedSource<T, K> {
    partitions: Arc<Vec<Vec<(T, K)>>>,
    comparer: KeyComparer<K>,
    state: OrdinalIndexState,
    ordered: bool,
}

impl<T, K: Ord + 'static> PartitionedSource<T, K> {
    pub fn new(partitions: Vec<Vec<(T, K)>>, state: OrdinalIndexState) -> Self {
        Self::with_comparer(partitions, state, default_comparer())
    }
}

impl<T, K> PartitionedSource<T, K> {
    pub fn with_comparer(partitions: Vec<Vec<(T, K)>>, state: OrdinalIndexState, comparer: KeyComparer<K>) -> Self {
        Self {
            partitions: Arc::new(partitions),
            comparer,
            state,
            ordered: false,
        }
    }

    pub fn as_ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl<T, K> Clone for PartitionedSource<T, K> {
    fn clone(&self) -> Self {
        Self {
            partitions: Arc::clone(&self.partitions),
            comparer: Arc::clone(&self.comparer),
            state: self.state,
            ordered: self.ordered,
        }
    }
}

impl<T, K> fmt::Debug for PartitionedSource<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedSource")
            .field("partitions", &self.partitions.len())
            .field("state", &self.state)
            .field("ordered", &self.ordered)
            .finish()
    }
}

impl<T, K> QueryOperator for PartitionedSource<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Clone + Send + Sync + 'static,
{
    type Item = T;
    type Key = K;

    fn name(&self) -> &'static str {
        "partitioned_source"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        self.state
    }

    fn output_ordered(&self) -> bool {
        self.ordered
    }

    fn open(&self, _settings: &QuerySettings, _prefer_striping: bool) -> Result<Box<dyn QueryResults<T, K>>> {
        Ok(Box::new(self.clone()))
    }

    /// Partitions concatenated in index order; stable-sorted by key when
    /// ordered. Matches what a premature merge of this source produces.
    fn as_sequential_query(&self, _token: &CancellationToken) -> Result<SequentialQuery<T>> {
        let mut pairs: Vec<&(T, K)> = self.partitions.iter().flatten().collect();
        if self.ordered {
            pairs.sort_by(|a, b| (self.comparer)(&a.1, &b.1));
        }
        let items: Vec<T> = pairs.into_iter().map(|(item, _)| item.clone()).collect();
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn limits_parallelism(&self) -> bool {
        false
    }
}

impl<T, K> QueryResults<T, K> for PartitionedSource<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Clone + Send + Sync + 'static,
{
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<T, K>> {
        let partitions = (0..self.partitions.len())
            .map(|p| {
                Box::new(SlicePartitionEnumerator {
                    partitions: Arc::clone(&self.partitions),
                    partition: p,
                    next: 0,
                }) as BoxedEnumerator<T, K>
            })
            .collect();
        Ok(PartitionedStream::new(partitions, Arc::clone(&self.comparer), self.state))
    }
}

struct SlicePartitionEnumerator<T, K> {
    partitions: Arc<Vec<Vec<(T, K)>>>,
    partition: usize,
    next: usize,
}

impl<T, K> QueryOperatorEnumerator<T, K> for SlicePartitionEnumerator<T, K>
where
    T: Clone + Send + Sync,
    K: Clone + Send + Sync,
{
    fn move_next(&mut self) -> Result<Option<(T, K)>> {
        let slice = &self.partitions[self.partition];
        match slice.get(self.next) {
            Some(pair) => {
                self.next += 1;
                Ok(Some(pair.clone()))
            }
            None => Ok(None),
        }
    }

    fn dispose(&mut self) {
        self.next = self.partitions[self.partition].len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partq_core::config::QueryConfig;

    fn settings(dop: usize) -> QuerySettings {
        QuerySettings::new(QueryConfig::default().with_degree_of_parallelism(dop))
    }

    fn drain<T, K>(stream: PartitionedStream<T, K>) -> Vec<Vec<(T, K)>> {
        stream
            .into_partitions()
            .into_iter()
            .map(|mut p| std::iter::from_fn(|| p.move_next().unwrap()).collect())
            .collect()
    }

    #[test]
    fn array_source_contiguous_and_striped() {
        let source = ArraySource::new(vec![10, 11, 12, 13, 14]);
        let contiguous = drain(source.open(&settings(2), false).unwrap().partitioned_stream().unwrap());
        assert_eq!(contiguous, vec![vec![(10, 0), (11, 1), (12, 2)], vec![(13, 3), (14, 4)]]);
        let striped = drain(source.open(&settings(2), true).unwrap().partitioned_stream().unwrap());
        assert_eq!(striped, vec![vec![(10, 0), (12, 2), (14, 4)], vec![(11, 1), (13, 3)]]);
    }

    #[test]
    fn array_source_exposes_indexed_results() {
        let source = ArraySource::new(vec!["a", "b"]);
        let results = source.open(&settings(4), false).unwrap();
        let indexed = results.indexed().unwrap();
        assert_eq!(indexed.elements_count(), 2);
        assert_eq!(indexed.get_element(1), Some("b"));
        assert_eq!(indexed.get_element(2), None);
    }

    fn sequential<T: Clone + Send + Sync + 'static, K: Clone + Send + Sync + 'static>(
        source: &PartitionedSource<T, K>,
    ) -> Vec<T> {
        source
            .as_sequential_query(&CancellationToken::none())
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn partitioned_source_sequential_form_is_key_ordered_when_ordered() {
        let source = PartitionedSource::new(
            vec![vec![('c', 4), ('a', 0)], vec![('b', 2)]],
            OrdinalIndexState::Shuffled,
        )
        .as_ordered();
        assert_eq!(sequential(&source), vec!['a', 'b', 'c']);
    }

    #[test]
    fn partitioned_source_sequential_form_concatenates_when_unordered() {
        let source = PartitionedSource::new(
            vec![vec![('c', 4), ('a', 0)], vec![('b', 2)]],
            OrdinalIndexState::Shuffled,
        );
        assert_eq!(sequential(&source), vec!['c', 'a', 'b']);
        let stream = source.open(&settings(8), false).unwrap().partitioned_stream().unwrap();
        assert_eq!(stream.partition_count(), 2);
        assert_eq!(stream.ordinal_index_state(), OrdinalIndexState::Shuffled);
    }
}
