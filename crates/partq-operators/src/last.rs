//! Last: the element with the greatest key among those matching an optional
//! predicate.
//!
//! Each partition scans its whole slice and remembers its last match
//! (`Increasing` keys make that the partition's greatest). It then offers the
//! candidate to a shared record under a lock, replacing the current winner
//! only if its key compares greater, and signals a barrier sized to the
//! partition count. Partitions holding a candidate wait for the barrier and
//! then check whether they won; only the winner yields, with key 0.
//!
//! The lock and the barrier are separate primitives. The barrier is
//! signaled through a drop guard so a partition that fails or unwinds still
//! releases its siblings.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::{QueryError, Result};
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{default_comparer, BoxedEnumerator, KeyComparer, PartitionedStream, QueryOperatorEnumerator};
use partq_core::sync::{CountdownEvent, Shared};
use partq_sched::settings::QuerySettings;

use crate::operator::{QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator};
use crate::premature::{execute_and_collect_results, PrematureMerge};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Last<C: QueryOperator> {
    child: C,
    predicate: Option<Predicate<C::Item>>,
    merge: PrematureMerge,
}

impl<C: QueryOperator> Last<C> {
    pub fn new(child: C) -> Self {
        Self::build(child, None)
    }

    pub fn with_predicate<F>(child: C, predicate: F) -> Self
    where
        F: Fn(&C::Item) -> bool + Send + Sync + 'static,
    {
        Self::build(child, Some(Arc::new(predicate)))
    }

    fn build(child: C, predicate: Option<Predicate<C::Item>>) -> Self {
        let merge = PrematureMerge::decide(child.ordinal_index_state(), OrdinalIndexState::Increasing);
        Self {
            child,
            predicate,
            merge,
        }
    }

    pub fn premature_merge(&self) -> bool {
        self.merge.required
    }

    fn wrap_keyed<K: Send + 'static>(
        &self,
        input: PartitionedStream<C::Item, K>,
        settings: &QuerySettings,
    ) -> PartitionedStream<C::Item, usize> {
        let (partitions, comparer, _) = input.into_parts();
        let shared = Shared::new(LastState { key: None, partition: None });
        let barrier = CountdownEvent::new(partitions.len());
        let partitions = partitions
            .into_iter()
            .enumerate()
            .map(|(partition, source)| {
                Box::new(LastEnumerator {
                    source,
                    predicate: self.predicate.clone(),
                    comparer: Arc::clone(&comparer),
                    shared: shared.clone(),
                    barrier: barrier.clone(),
                    partition,
                    token: settings.merged_token().clone(),
                    already_searched: false,
                    #[cfg(feature = "tracing")]
                    query_id: settings.query_id(),
                }) as BoxedEnumerator<C::Item, usize>
            })
            .collect();
        PartitionedStream::new(partitions, default_comparer(), OrdinalIndexState::Shuffled)
    }
}

impl<C: QueryOperator> Clone for Last<C> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            predicate: self.predicate.clone(),
            merge: self.merge,
        }
    }
}

impl<C: QueryOperator + fmt::Debug> fmt::Debug for Last<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Last")
            .field("child", &self.child)
            .field("filtered", &self.predicate.is_some())
            .field("merge", &self.merge)
            .finish()
    }
}

impl<C: QueryOperator> QueryOperator for Last<C> {
    type Item = C::Item;
    type Key = usize;

    fn name(&self) -> &'static str {
        "last"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        OrdinalIndexState::Shuffled
    }

    fn output_ordered(&self) -> bool {
        self.child.output_ordered()
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<C::Item, usize>>> {
        self.open_unary(settings, prefer_striping)
    }

    fn as_sequential_query(&self, _token: &CancellationToken) -> Result<SequentialQuery<C::Item>> {
        Err(QueryError::SequentialNotSupported("last"))
    }

    /// Repairing the child's order never costs more than the sequential
    /// scan would.
    fn limits_parallelism(&self) -> bool {
        false
    }
}

impl<C: QueryOperator> UnaryQueryOperator for Last<C> {
    type Child = C;

    fn child(&self) -> &C {
        &self.child
    }

    fn wrap_partitioned_stream(
        &self,
        input: PartitionedStream<C::Item, C::Key>,
        settings: &QuerySettings,
        prefer_striping: bool,
    ) -> Result<PartitionedStream<C::Item, usize>> {
        if self.merge.required {
            let merged = execute_and_collect_results(
                input,
                self.child.output_ordered(),
                prefer_striping,
                settings,
                self.name(),
            )?
            .into_partitioned_stream();
            Ok(self.wrap_keyed(merged, settings))
        } else {
            Ok(self.wrap_keyed(input, settings))
        }
    }
}

struct LastState<K> {
    key: Option<K>,
    partition: Option<usize>,
}

struct LastEnumerator<T, K> {
    source: BoxedEnumerator<T, K>,
    predicate: Option<Predicate<T>>,
    comparer: KeyComparer<K>,
    shared: Shared<LastState<K>>,
    barrier: CountdownEvent,
    partition: usize,
    token: CancellationToken,
    already_searched: bool,
    #[cfg(feature = "tracing")]
    query_id: partq_core::id::QueryId,
}

impl<T, K: Send> LastEnumerator<T, K> {
    /// Scan the local slice and offer the last match to the shared record.
    /// Returns the local candidate, if any.
    fn search(&mut self) -> Result<Option<T>> {
        let _signal = self.barrier.signal_on_drop();

        let mut candidate: Option<(T, K)> = None;
        let mut polled = 0usize;
        loop {
            if should_poll(polled) {
                self.token.throw_if_canceled()?;
            }
            polled = polled.wrapping_add(1);
            match self.source.move_next()? {
                Some((item, key)) => {
                    let matches = match &self.predicate {
                        Some(predicate) => predicate(&item),
                        None => true,
                    };
                    if matches {
                        candidate = Some((item, key));
                    }
                }
                None => break,
            }
        }

        let Some((item, key)) = candidate else {
            return Ok(None);
        };
        let mut state = self.shared.lock();
        let replace = match &state.key {
            None => true,
            Some(current) => (self.comparer)(&key, current) == Ordering::Greater,
        };
        if replace {
            state.key = Some(key);
            state.partition = Some(self.partition);
        }
        Ok(Some(item))
    }
}

impl<T, K: Send> QueryOperatorEnumerator<T, usize> for LastEnumerator<T, K> {
    fn move_next(&mut self) -> Result<Option<(T, usize)>> {
        if self.already_searched {
            return Ok(None);
        }
        self.already_searched = true;

        let Some(item) = self.search()? else {
            return Ok(None);
        };

        // Every partition has now offered its candidate or given up.
        self.barrier.wait(&self.token)?;

        let won = self.shared.lock().partition == Some(self.partition);
        if !won {
            return Ok(None);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(query = %self.query_id, partition = self.partition, "last: winner decided");
        Ok(Some((item, 0)))
    }

    fn dispose(&mut self) {
        self.source.dispose();
    }
}
