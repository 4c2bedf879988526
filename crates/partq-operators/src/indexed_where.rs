//! IndexedWhere: filter with a predicate that also sees the element's
//! position in the logical sequence.
//!
//! The position is the child's `usize` key, so the child must provide
//! `Correct` keys; anything weaker is repaired by a premature merge first.
//! The output keeps the surviving keys (gaps where elements were dropped)
//! and is `Increasing` and ordered.

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::Result;
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{BoxedEnumerator, PartitionedStream, QueryOperatorEnumerator};
use partq_sched::settings::QuerySettings;

use crate::operator::{
    CancellableIter, QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator,
};
use crate::premature::{execute_and_collect_results, PrematureMerge};

type IndexedPredicate<T> = Arc<dyn Fn(&T, usize) -> bool + Send + Sync>;

pub struct IndexedWhere<C: QueryOperator<Key = usize>> {
    child: C,
    predicate: IndexedPredicate<C::Item>,
    merge: PrematureMerge,
}

impl<C: QueryOperator<Key = usize>> IndexedWhere<C> {
    pub fn new<F>(child: C, predicate: F) -> Self
    where
        F: Fn(&C::Item, usize) -> bool + Send + Sync + 'static,
    {
        let merge = PrematureMerge::decide(child.ordinal_index_state(), OrdinalIndexState::Correct);
        Self {
            child,
            predicate: Arc::new(predicate),
            merge,
        }
    }

    pub fn premature_merge(&self) -> bool {
        self.merge.required
    }
}

impl<C: QueryOperator<Key = usize>> Clone for IndexedWhere<C> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            predicate: Arc::clone(&self.predicate),
            merge: self.merge,
        }
    }
}

impl<C: QueryOperator<Key = usize> + fmt::Debug> fmt::Debug for IndexedWhere<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedWhere")
            .field("child", &self.child)
            .field("merge", &self.merge)
            .finish()
    }
}

impl<C: QueryOperator<Key = usize>> QueryOperator for IndexedWhere<C> {
    type Item = C::Item;
    type Key = usize;

    fn name(&self) -> &'static str {
        "indexed_where"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        OrdinalIndexState::Increasing
    }

    fn output_ordered(&self) -> bool {
        true
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<C::Item, usize>>> {
        self.open_unary(settings, prefer_striping)
    }

    fn as_sequential_query(&self, token: &CancellationToken) -> Result<SequentialQuery<C::Item>> {
        let predicate = Arc::clone(&self.predicate);
        // Poll on child elements, not survivors.
        let filtered = CancellableIter::new(self.child.as_sequential_query(token)?, token.clone())
            .enumerate()
            .filter(move |(index, item)| match item {
                Ok(x) => predicate(x, *index),
                Err(_) => true,
            })
            .map(|(_, item)| item);
        Ok(Box::new(filtered))
    }

    fn limits_parallelism(&self) -> bool {
        self.merge.limits_parallelism
    }
}

impl<C: QueryOperator<Key = usize>> UnaryQueryOperator for IndexedWhere<C> {
    type Child = C;

    fn child(&self) -> &C {
        &self.child
    }

    fn wrap_partitioned_stream(
        &self,
        input: PartitionedStream<C::Item, usize>,
        settings: &QuerySettings,
        prefer_striping: bool,
    ) -> Result<PartitionedStream<C::Item, usize>> {
        let input = if self.merge.required {
            execute_and_collect_results(
                input,
                self.child.output_ordered(),
                prefer_striping,
                settings,
                self.name(),
            )?
            .into_partitioned_stream()
        } else {
            input
        };
        let (partitions, comparer, _) = input.into_parts();
        let token = settings.merged_token();
        let partitions = partitions
            .into_iter()
            .map(|source| {
                Box::new(IndexedWhereEnumerator {
                    source,
                    predicate: Arc::clone(&self.predicate),
                    token: token.clone(),
                    polled: 0,
                }) as BoxedEnumerator<C::Item, usize>
            })
            .collect();
        Ok(PartitionedStream::new(partitions, comparer, OrdinalIndexState::Increasing))
    }
}

struct IndexedWhereEnumerator<T> {
    source: BoxedEnumerator<T, usize>,
    predicate: IndexedPredicate<T>,
    token: CancellationToken,
    polled: usize,
}

impl<T> QueryOperatorEnumerator<T, usize> for IndexedWhereEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<(T, usize)>> {
        loop {
            if should_poll(self.polled) {
                self.token.throw_if_canceled()?;
            }
            self.polled = self.polled.wrapping_add(1);
            match self.source.move_next()? {
                Some((item, key)) if (self.predicate)(&item, key) => return Ok(Some((item, key))),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    fn dispose(&mut self) {
        self.source.dispose();
    }
}
