//! ForAll: run an action on every element, in parallel, for effect only.
//! The partitioned stream it produces never yields.

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::{QueryError, Result};
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{BoxedEnumerator, PartitionedStream, QueryOperatorEnumerator};
use partq_sched::settings::QuerySettings;

use crate::operator::{QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator};

type Action<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct ForAll<C: QueryOperator> {
    child: C,
    action: Action<C::Item>,
}

impl<C: QueryOperator> ForAll<C> {
    pub fn new<F>(child: C, action: F) -> Self
    where
        F: Fn(C::Item) + Send + Sync + 'static,
    {
        Self {
            child,
            action: Arc::new(action),
        }
    }
}

impl<C: QueryOperator> Clone for ForAll<C> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<C: QueryOperator + fmt::Debug> fmt::Debug for ForAll<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForAll").field("child", &self.child).finish()
    }
}

impl<C: QueryOperator> QueryOperator for ForAll<C> {
    type Item = C::Item;
    type Key = C::Key;

    fn name(&self) -> &'static str {
        "for_all"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        OrdinalIndexState::Correct
    }

    fn output_ordered(&self) -> bool {
        false
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<C::Item, C::Key>>> {
        self.open_unary(settings, prefer_striping)
    }

    fn as_sequential_query(&self, _token: &CancellationToken) -> Result<SequentialQuery<C::Item>> {
        Err(QueryError::SequentialNotSupported("for_all"))
    }

    fn limits_parallelism(&self) -> bool {
        false
    }
}

impl<C: QueryOperator> UnaryQueryOperator for ForAll<C> {
    type Child = C;

    fn child(&self) -> &C {
        &self.child
    }

    fn wrap_partitioned_stream(
        &self,
        input: PartitionedStream<C::Item, C::Key>,
        settings: &QuerySettings,
        _prefer_striping: bool,
    ) -> Result<PartitionedStream<C::Item, C::Key>> {
        let (partitions, comparer, _) = input.into_parts();
        let partitions = partitions
            .into_iter()
            .map(|source| {
                Box::new(ForAllEnumerator {
                    source,
                    action: Arc::clone(&self.action),
                    token: settings.merged_token().clone(),
                }) as BoxedEnumerator<C::Item, C::Key>
            })
            .collect();
        Ok(PartitionedStream::new(partitions, comparer, OrdinalIndexState::Correct))
    }
}

struct ForAllEnumerator<T, K> {
    source: BoxedEnumerator<T, K>,
    action: Action<T>,
    token: CancellationToken,
}

impl<T, K> QueryOperatorEnumerator<T, K> for ForAllEnumerator<T, K> {
    /// Applies the action to the whole partition, then reports exhaustion.
    fn move_next(&mut self) -> Result<Option<(T, K)>> {
        let mut polled = 0usize;
        while let Some((item, _)) = self.source.move_next()? {
            if should_poll(polled) {
                self.token.throw_if_canceled()?;
            }
            polled = polled.wrapping_add(1);
            (self.action)(item);
        }
        Ok(None)
    }

    fn dispose(&mut self) {
        self.source.dispose();
    }
}
