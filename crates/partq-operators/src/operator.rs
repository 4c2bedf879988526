//! Operator contract.
//!
//! An operator is a node in a compile-time generic chain. The element and
//! key types it produces are associated types, so a parent knows its
//! child's key type statically and `wrap_partitioned_stream` can simply
//! return the wrapped stream.
//!
//! Opening an operator yields `QueryResults`: a one-shot handle that hands
//! out the partitioned stream and, for sources that support it, random
//! access by position (`IndexedResults`).

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::{QueryError, Result};
use partq_core::ordinal::OrdinalIndexState;
use partq_core::stream::PartitionedStream;
use partq_sched::settings::QuerySettings;

/// Cancellation-aware sequential form of an operator.
pub type SequentialQuery<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Trait that all operators implement.
///
/// Invariants:
/// - `ordinal_index_state` describes the keys of the stream `open` produces.
/// - `limits_parallelism` is true only when running in parallel would add
///   serialization that the sequential form avoids.
pub trait QueryOperator: Clone + Send + Sync + 'static {
    type Item: Send + 'static;
    type Key: Send + 'static;

    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    fn ordinal_index_state(&self) -> OrdinalIndexState;

    /// Whether consumers must reassemble the output in key order.
    fn output_ordered(&self) -> bool;

    fn open(
        &self,
        settings: &QuerySettings,
        prefer_striping: bool,
    ) -> Result<Box<dyn QueryResults<Self::Item, Self::Key>>>;

    fn as_sequential_query(&self, token: &CancellationToken) -> Result<SequentialQuery<Self::Item>>;

    fn limits_parallelism(&self) -> bool;
}

/// An operator with exactly one input.
pub trait UnaryQueryOperator: QueryOperator {
    type Child: QueryOperator;

    fn child(&self) -> &Self::Child;

    /// Build this operator's partitioned stream on top of the child's.
    fn wrap_partitioned_stream(
        &self,
        input: PartitionedStream<
            <Self::Child as QueryOperator>::Item,
            <Self::Child as QueryOperator>::Key,
        >,
        settings: &QuerySettings,
        prefer_striping: bool,
    ) -> Result<PartitionedStream<Self::Item, Self::Key>>;

    /// Default `open`: open the child and defer wrapping until the stream is
    /// requested.
    fn open_unary(
        &self,
        settings: &QuerySettings,
        prefer_striping: bool,
    ) -> Result<Box<dyn QueryResults<Self::Item, Self::Key>>> {
        let child = self.child().open(settings, prefer_striping)?;
        Ok(Box::new(UnaryQueryOperatorResults::new(
            self.clone(),
            child,
            settings.clone(),
            prefer_striping,
        )))
    }
}

/// Results of an opened operator.
pub trait QueryResults<T, K>: Send {
    /// Hand out the partitioned stream. Consumes the results.
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<T, K>>;

    /// Random access by position, when the results support it.
    fn indexed(&self) -> Option<Arc<dyn IndexedResults<T>>> {
        None
    }
}

pub trait IndexedResults<T>: Send + Sync {
    fn elements_count(&self) -> usize;

    fn get_element(&self, index: usize) -> Option<T>;
}

/// Results of a unary operator: the opened child plus the operator, wrapped
/// lazily when the stream is requested.
pub struct UnaryQueryOperatorResults<Op: UnaryQueryOperator> {
    op: Op,
    child: Box<dyn QueryResults<<Op::Child as QueryOperator>::Item, <Op::Child as QueryOperator>::Key>>,
    settings: QuerySettings,
    prefer_striping: bool,
}

impl<Op: UnaryQueryOperator> UnaryQueryOperatorResults<Op> {
    pub fn new(
        op: Op,
        child: Box<dyn QueryResults<<Op::Child as QueryOperator>::Item, <Op::Child as QueryOperator>::Key>>,
        settings: QuerySettings,
        prefer_striping: bool,
    ) -> Self {
        Self {
            op,
            child,
            settings,
            prefer_striping,
        }
    }

    pub fn child_indexed(&self) -> Option<Arc<dyn IndexedResults<<Op::Child as QueryOperator>::Item>>> {
        self.child.indexed()
    }
}

impl<Op: UnaryQueryOperator> QueryResults<Op::Item, Op::Key> for UnaryQueryOperatorResults<Op> {
    fn partitioned_stream(self: Box<Self>) -> Result<PartitionedStream<Op::Item, Op::Key>> {
        let this = *self;
        let input = this.child.partitioned_stream()?;
        this.op
            .wrap_partitioned_stream(input, &this.settings, this.prefer_striping)
    }
}

/// Sequential iterator that polls a token every `POLL_INTERVAL + 1` items and
/// stops with `Canceled` once it trips.
pub struct CancellableIter<T> {
    inner: SequentialQuery<T>,
    token: CancellationToken,
    count: usize,
    finished: bool,
}

impl<T> CancellableIter<T> {
    pub fn new(inner: SequentialQuery<T>, token: CancellationToken) -> Self {
        Self {
            inner,
            token,
            count: 0,
            finished: false,
        }
    }
}

impl<T> Iterator for CancellableIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.finished {
            return None;
        }
        if should_poll(self.count) && self.token.is_canceled() {
            self.finished = true;
            return Some(Err(QueryError::Canceled));
        }
        self.count = self.count.wrapping_add(1);
        let next = self.inner.next();
        if matches!(next, None | Some(Err(_))) {
            self.finished = true;
        }
        next
    }
}

impl<T> fmt::Debug for CancellableIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableIter")
            .field("count", &self.count)
            .field("finished", &self.finished)
            .finish()
    }
}
