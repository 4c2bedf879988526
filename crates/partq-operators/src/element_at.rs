//! ElementAt: the element whose logical position equals `index`.
//!
//! Every partition scans its slice for the key `index`. With `Correct` keys
//! exactly one partition can own it; that partition raises a shared flag so
//! the others stop scanning at their next step.

use std::fmt;

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::{QueryError, Result};
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{BoxedEnumerator, PartitionedStream, QueryOperatorEnumerator};
use partq_core::sync::SharedFlag;
use partq_sched::settings::QuerySettings;

use crate::operator::{QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator};
use crate::premature::{execute_and_collect_results, PrematureMerge};

pub struct ElementAt<C: QueryOperator<Key = usize>> {
    child: C,
    index: usize,
    merge: PrematureMerge,
}

impl<C: QueryOperator<Key = usize>> ElementAt<C> {
    pub fn new(child: C, index: usize) -> Self {
        let merge = PrematureMerge::decide(child.ordinal_index_state(), OrdinalIndexState::Correct);
        Self { child, index, merge }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn premature_merge(&self) -> bool {
        self.merge.required
    }
}

impl<C: QueryOperator<Key = usize>> Clone for ElementAt<C> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            index: self.index,
            merge: self.merge,
        }
    }
}

impl<C: QueryOperator<Key = usize> + fmt::Debug> fmt::Debug for ElementAt<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementAt")
            .field("child", &self.child)
            .field("index", &self.index)
            .field("merge", &self.merge)
            .finish()
    }
}

impl<C: QueryOperator<Key = usize>> QueryOperator for ElementAt<C> {
    type Item = C::Item;
    type Key = usize;

    fn name(&self) -> &'static str {
        "element_at"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        OrdinalIndexState::Correct
    }

    fn output_ordered(&self) -> bool {
        self.child.output_ordered()
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<C::Item, usize>>> {
        self.open_unary(settings, prefer_striping)
    }

    fn as_sequential_query(&self, _token: &CancellationToken) -> Result<SequentialQuery<C::Item>> {
        Err(QueryError::SequentialNotSupported("element_at"))
    }

    fn limits_parallelism(&self) -> bool {
        self.merge.limits_parallelism
    }
}

impl<C: QueryOperator<Key = usize>> UnaryQueryOperator for ElementAt<C> {
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
        let result_found = SharedFlag::new();
        let partitions = partitions
            .into_iter()
            .map(|source| {
                Box::new(ElementAtEnumerator {
                    source,
                    index: self.index,
                    result_found: result_found.clone(),
                    token: settings.merged_token().clone(),
                    polled: 0,
                }) as BoxedEnumerator<C::Item, usize>
            })
            .collect();
        Ok(PartitionedStream::new(partitions, comparer, OrdinalIndexState::Correct))
    }
}

struct ElementAtEnumerator<T> {
    source: BoxedEnumerator<T, usize>,
    index: usize,
    result_found: SharedFlag,
    token: CancellationToken,
    polled: usize,
}

impl<T> QueryOperatorEnumerator<T, usize> for ElementAtEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<(T, usize)>> {
        while !self.result_found.get() {
            if should_poll(self.polled) {
                self.token.throw_if_canceled()?;
            }
            self.polled = self.polled.wrapping_add(1);
            match self.source.move_next()? {
                Some((item, key)) if key == self.index => {
                    self.result_found.set();
                    return Ok(Some((item, key)));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    fn dispose(&mut self) {
        self.source.dispose();
    }
}
