//! Select: map each element, keep its key.
//!
//! Keys and ordinal state pass through untouched. When the child offers
//! random access, so does Select, applying the selector only to the elements
//! actually requested.

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::CancellationToken;
use partq_core::error::Result;
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::{BoxedEnumerator, PartitionedStream, QueryOperatorEnumerator};
use partq_sched::settings::QuerySettings;

use crate::operator::{
    IndexedResults, QueryOperator, QueryResults, SequentialQuery, UnaryQueryOperator, UnaryQueryOperatorResults,
};

type Selector<T, U> = Arc<dyn Fn(T) -> U + Send + Sync>;

pub struct Select<C: QueryOperator, U> {
    child: C,
    selector: Selector<C::Item, U>,
}

impl<C: QueryOperator, U> Select<C, U> {
    pub fn new<F>(child: C, selector: F) -> Self
    where
        F: Fn(C::Item) -> U + Send + Sync + 'static,
    {
        Self {
            child,
            selector: Arc::new(selector),
        }
    }
}

impl<C: QueryOperator, U> Clone for Select<C, U> {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<C: QueryOperator + fmt::Debug, U> fmt::Debug for Select<C, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select").field("child", &self.child).finish()
    }
}

impl<C, U> QueryOperator for Select<C, U>
where
    C: QueryOperator,
    U: Send + 'static,
{
    type Item = U;
    type Key = C::Key;

    fn name(&self) -> &'static str {
        "select"
    }

    fn ordinal_index_state(&self) -> OrdinalIndexState {
        self.child.ordinal_index_state()
    }

    fn output_ordered(&self) -> bool {
        self.child.output_ordered()
    }

    fn open(&self, settings: &QuerySettings, prefer_striping: bool) -> Result<Box<dyn QueryResults<U, C::Key>>> {
        let child = self.child.open(settings, prefer_striping)?;
        Ok(Box::new(SelectQueryOperatorResults {
            inner: UnaryQueryOperatorResults::new(self.clone(), child, settings.clone(), prefer_striping),
            selector: Arc::clone(&self.selector),
        }))
    }

    fn as_sequential_query(&self, token: &CancellationToken) -> Result<SequentialQuery<U>> {
        let selector = Arc::clone(&self.selector);
        let inner = self.child.as_sequential_query(token)?;
        Ok(Box::new(inner.map(move |item| item.map(|x| selector(x)))))
    }

    fn limits_parallelism(&self) -> bool {
        self.child.limits_parallelism()
    }
}

impl<C, U> UnaryQueryOperator for Select<C, U>
where
    C: QueryOperator,
    U: Send + 'static,
{
    type Child = C;

    fn child(&self) -> &C {
        &self.child
    }

    fn wrap_partitioned_stream(
        &self,
        input: PartitionedStream<C::Item, C::Key>,
        _settings: &QuerySettings,
        _prefer_striping: bool,
    ) -> Result<PartitionedStream<U, C::Key>> {
        let (partitions, comparer, state) = input.into_parts();
        let partitions = partitions
            .into_iter()
            .map(|source| {
                Box::new(SelectEnumerator {
                    source,
                    selector: Arc::clone(&self.selector),
                }) as BoxedEnumerator<U, C::Key>
            })
            .collect();
        Ok(PartitionedStream::new(partitions, comparer, state))
    }
}

struct SelectQueryOperatorResults<C: QueryOperator, U: Send + 'static> {
    inner: UnaryQueryOperatorResults<Select<C, U>>,
    selector: Selector<C::Item, U>,
}

impl<C, U> QueryResults<U, C::Key> for SelectQueryOperatorResults<C, U>
where
    C: QueryOperator,
    U: Send + 'static,
{
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<U, C::Key>> {
        let this = *self;
        Box::new(this.inner).partitioned_stream()
    }

    fn indexed(&self) -> Option<Arc<dyn IndexedResults<U>>> {
        let child = self.inner.child_indexed()?;
        Some(Arc::new(SelectIndexed {
            child,
            selector: Arc::clone(&self.selector),
        }))
    }
}

struct SelectIndexed<T, U> {
    child: Arc<dyn IndexedResults<T>>,
    selector: Selector<T, U>,
}

impl<T, U> IndexedResults<U> for SelectIndexed<T, U> {
    fn elements_count(&self) -> usize {
        self.child.elements_count()
    }

    fn get_element(&self, index: usize) -> Option<U> {
        self.child.get_element(index).map(|x| (self.selector)(x))
    }
}

struct SelectEnumerator<T, U, K> {
    source: BoxedEnumerator<T, K>,
    selector: Selector<T, U>,
}

impl<T, U, K> QueryOperatorEnumerator<U, K> for SelectEnumerator<T, U, K> {
    fn move_next(&mut self) -> Result<Option<(U, K)>> {
        Ok(self
            .source
            .move_next()?
            .map(|(item, key)| ((self.selector)(item), key)))
    }

    fn dispose(&mut self) {
        self.source.dispose();
    }
}
