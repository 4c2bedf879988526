//! QueryExecutor: opens operator chains and drives them to a result.
//!
//! Spooling shape per execution:
//! - for effect: every partition drained in place, nothing returned;
//! - ordered output or `FullyBuffered`: stop-and-go spooling, the consumer
//!   starts after every partition finished (failures surface right here);
//! - otherwise: pipelined spooling into bounded channels read by an
//!   `AsynchronousChannelMergeEnumerator` (failures surface at the end of
//!   enumeration).

use std::sync::Arc;

use partq_core::cancel::CancellationToken;
use partq_core::config::{ExecutionMode, MergeOptions, QueryConfig};
use partq_core::error::{QueryError, Result};
use partq_core::sync::IntValueEvent;
use partq_operators::element_at::ElementAt;
use partq_operators::for_all::ForAll;
use partq_operators::last::Last;
use partq_operators::operator::{CancellableIter, QueryOperator, UnaryQueryOperator};
use partq_sched::channel::channel;
use partq_sched::scheduler::TaskScheduler;
use partq_sched::settings::QuerySettings;
use partq_sched::spooling::{spool_for_all, spool_pipeline, spool_stop_and_go};
use partq_sched::task::QueryTaskGroupState;

use crate::enumerator::QueryEnumerator;
use crate::merge::{AsynchronousChannelMergeEnumerator, SynchronousChannelMergeEnumerator};
use crate::metrics::emit_span;

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    settings: QuerySettings,
}

impl QueryExecutor {
    pub fn new(config: QueryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            settings: QuerySettings::new(config),
        })
    }

    /// Executor configured from `PARTQ_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(QueryConfig::from_env())
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.settings = self.settings.with_cancellation(token);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.settings = self.settings.with_scheduler(scheduler);
        self
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Open `op` and start its partitions.
    ///
    /// `merge_options` overrides the configured options for this execution.
    /// `suppress_order` lets the consumer take elements in any order even if
    /// the chain is output-ordered. With `for_effect` the query runs to
    /// completion here and `Ok(None)` is returned.
    pub fn get_opened_enumerator<Op: QueryOperator>(
        &self,
        op: &Op,
        merge_options: Option<MergeOptions>,
        suppress_order: bool,
        for_effect: bool,
    ) -> Result<Option<QueryEnumerator<Op::Item>>> {
        let settings = self.settings.with_per_execution_state();
        let merge_options = merge_options.unwrap_or(settings.merge_options());
        let ordered = op.output_ordered() && !suppress_order;

        emit_span(
            "query_open",
            &[
                ("query", settings.query_id().to_string()),
                ("operator", op.name().to_string()),
                ("merge_options", merge_options.to_string()),
                ("ordered", ordered.to_string()),
            ],
        );

        let stream = op.open(&settings, false)?.partitioned_stream()?;
        let group = QueryTaskGroupState::new(settings.cancellation().clone(), settings.query_id());

        if for_effect {
            let spooled = spool_for_all(&group, &settings, stream);
            self.finish_blocking(&group, spooled)?;
            return Ok(None);
        }

        if ordered || merge_options == MergeOptions::FullyBuffered {
            let comparer = ordered.then(|| stream.key_comparer());
            let spooled = spool_stop_and_go(&group, &settings, stream);
            let channels = self.finish_blocking(&group, spooled)?;
            let merge = SynchronousChannelMergeEnumerator::new(channels, comparer);
            return Ok(Some(QueryEnumerator::new(Box::new(merge))));
        }

        let event = Arc::new(IntValueEvent::new());
        let chunk_size = settings.config().effective_chunk_size(merge_options);
        let capacity = settings.config().bounded_buffer_capacity;
        let token = settings.merged_token().clone();
        let (writers, readers): (Vec<_>, Vec<_>) = (0..stream.partition_count())
            .map(|index| channel(index, capacity, chunk_size, Some(Arc::clone(&event)), token.clone()))
            .unzip();
        // From here on the merge enumerator owns the readers; dropping it on
        // a spawn failure cancels and waits for whatever already started.
        let merge = AsynchronousChannelMergeEnumerator::new(readers, event, group.clone(), token);
        spool_pipeline(&group, &settings, stream, writers)?;
        Ok(Some(QueryEnumerator::new(Box::new(merge))))
    }

    /// Wait for a blocking spool to finish. If spawning failed part-way,
    /// stop what already started before reporting.
    fn finish_blocking<R>(&self, group: &QueryTaskGroupState, spooled: Result<R>) -> Result<R> {
        match spooled {
            Ok(value) => {
                let ended = group.query_end(false);
                emit_span(
                    "query_end",
                    &[
                        ("query", group.query_id().to_string()),
                        ("ok", ended.is_ok().to_string()),
                    ],
                );
                ended.map(|()| value)
            }
            Err(e) => {
                group.cancel();
                let _ = group.query_end(true);
                Err(e)
            }
        }
    }

    /// Open `op` with the configured merge options.
    pub fn enumerate<Op: QueryOperator>(&self, op: &Op) -> Result<QueryEnumerator<Op::Item>> {
        self.get_opened_enumerator(op, None, false, false)?
            .ok_or_else(|| QueryError::invariant("query opened for effect returned no enumerator"))
    }

    pub fn to_vec<Op: QueryOperator>(&self, op: &Op) -> Result<Vec<Op::Item>> {
        self.enumerate(op)?.collect()
    }

    pub fn element_at<C>(&self, op: &ElementAt<C>) -> Result<C::Item>
    where
        C: QueryOperator<Key = usize>,
    {
        self.element_at_or_default(op)?
            .ok_or(QueryError::IndexOutOfRange { index: op.index() })
    }

    /// `Ok(None)` when the index is past the end.
    ///
    /// When the parallel plan would serialize anyway (and parallelism is not
    /// forced), the child is walked sequentially instead.
    pub fn element_at_or_default<C>(&self, op: &ElementAt<C>) -> Result<Option<C::Item>>
    where
        C: QueryOperator<Key = usize>,
    {
        if op.limits_parallelism() && self.settings.execution_mode() != ExecutionMode::ForceParallelism {
            let token = self.settings.cancellation().external_token().clone();
            let sequential = CancellableIter::new(op.child().as_sequential_query(&token)?, token);
            for (position, item) in sequential.enumerate() {
                let item = item?;
                if position == op.index() {
                    return Ok(Some(item));
                }
            }
            return Ok(None);
        }
        self.single_result(op)
    }

    pub fn last<C: QueryOperator>(&self, op: &Last<C>) -> Result<C::Item> {
        self.last_or_default(op)?.ok_or(QueryError::NoMatch)
    }

    /// `Ok(None)` when no element matches.
    pub fn last_or_default<C: QueryOperator>(&self, op: &Last<C>) -> Result<Option<C::Item>> {
        self.single_result(op)
    }

    /// Run the action on every element. Returns once every partition is
    /// done; the first failure any partition hit is reported.
    pub fn for_all<C: QueryOperator>(&self, op: &ForAll<C>) -> Result<()> {
        match self.get_opened_enumerator(op, None, true, true)? {
            None => Ok(()),
            Some(_) => Err(QueryError::invariant("for_all produced an enumerator")),
        }
    }

    /// Drive an aggregate fully buffered; at most one element may come out.
    fn single_result<Op: QueryOperator>(&self, op: &Op) -> Result<Option<Op::Item>> {
        let mut results = self
            .get_opened_enumerator(op, Some(MergeOptions::FullyBuffered), true, false)?
            .ok_or_else(|| QueryError::invariant("aggregate opened without an enumerator"))?;
        if !results.move_next()? {
            return Ok(None);
        }
        let item = results.take_current()?;
        if results.move_next()? {
            return Err(QueryError::invariant(format!(
                "{} produced more than one result",
                op.name()
            )));
        }
        Ok(Some(item))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self {
            settings: QuerySettings::default(),
        }
    }
}
