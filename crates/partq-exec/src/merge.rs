//! Merge enumerators: many partitions in, one pull sequence out.
//!
//! `SynchronousChannelMergeEnumerator` reads channels that stop-and-go
//! spooling has already filled, optionally in key order.
//! `AsynchronousChannelMergeEnumerator` reads bounded channels while their
//! producers are still running. It gives no global order; it visits
//! channels round-robin and blocks only when every live channel is empty.

use std::fmt;
use std::sync::Arc;
use std::vec;

use partq_core::cancel::CancellationToken;
use partq_core::error::{QueryError, Result};
use partq_core::stream::KeyComparer;
use partq_core::sync::IntValueEvent;
use partq_sched::channel::{ChannelReader, DequeueOutcome, SynchronousChannel, WaitRegistration};
use partq_sched::task::QueryTaskGroupState;

use crate::metrics::emit_span;

/// Pull side of a merged query.
pub trait MergeEnumerator<T>: Send {
    /// Next element, or `None` once every partition is exhausted.
    fn move_next(&mut self) -> Result<Option<T>>;
}

pub struct SynchronousChannelMergeEnumerator<T> {
    items: vec::IntoIter<T>,
}

impl<T> SynchronousChannelMergeEnumerator<T> {
    /// Concatenate the channels in partition order, or stable-sort the
    /// union by key when a comparer is given.
    pub fn new<K>(channels: Vec<SynchronousChannel<(T, K)>>, comparer: Option<KeyComparer<K>>) -> Self {
        let mut pairs: Vec<(T, K)> = Vec::new();
        for channel in &channels {
            pairs.extend(channel.take_all());
        }
        if let Some(comparer) = comparer {
            pairs.sort_by(|a, b| comparer(&a.1, &b.1));
        }
        let items: Vec<T> = pairs.into_iter().map(|(item, _)| item).collect();
        Self {
            items: items.into_iter(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T: Send> MergeEnumerator<T> for SynchronousChannelMergeEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<T>> {
        Ok(self.items.next())
    }
}

impl<T> fmt::Debug for SynchronousChannelMergeEnumerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronousChannelMergeEnumerator")
            .field("remaining", &self.items.len())
            .finish()
    }
}

pub struct AsynchronousChannelMergeEnumerator<T> {
    channels: Vec<ChannelReader<T>>,
    done: Vec<bool>,
    done_count: usize,
    channel_index: usize,
    consumer_event: Arc<IntValueEvent>,
    group: QueryTaskGroupState,
    token: CancellationToken,
    yielded: u64,
    query_ended: bool,
}

impl<T> AsynchronousChannelMergeEnumerator<T> {
    /// `consumer_event` must be the event every channel's producer signals.
    pub fn new(
        channels: Vec<ChannelReader<T>>,
        consumer_event: Arc<IntValueEvent>,
        group: QueryTaskGroupState,
        token: CancellationToken,
    ) -> Self {
        let count = channels.len();
        Self {
            channels,
            done: vec![false; count],
            done_count: 0,
            channel_index: 0,
            consumer_event,
            group,
            token,
            yielded: 0,
            query_ended: false,
        }
    }

    fn yield_from(&mut self, index: usize, item: T) -> Result<Option<T>> {
        self.channel_index = (index + 1) % self.channels.len();
        self.yielded += 1;
        Ok(Some(item))
    }

    fn mark_done(&mut self, index: usize) {
        if !self.done[index] {
            self.done[index] = true;
            self.done_count += 1;
            self.channels[index].dispose();
        }
    }

    /// Every channel is done: wait for the producers and surface any
    /// failure they recorded.
    fn end_query(&mut self) -> Result<Option<T>> {
        self.query_ended = true;
        self.group.query_end(false)?;
        emit_span(
            "channel_merge_completed",
            &[
                ("query", self.group.query_id().to_string()),
                ("channels", self.channels.len().to_string()),
                ("yielded", self.yielded.to_string()),
            ],
        );
        Ok(None)
    }

    /// A blocking wait was canceled. A producer failure outranks the
    /// cancellation it caused.
    fn end_canceled(&mut self, error: QueryError) -> Result<Option<T>> {
        self.query_ended = true;
        self.group.query_end(false)?;
        Err(error)
    }

    fn move_next_slow(&mut self) -> Result<Option<T>> {
        let count = self.channels.len();
        let mut index = self.channel_index;
        loop {
            for _ in 0..count {
                if !self.done[index] {
                    if let Some(item) = self.channels[index].try_dequeue() {
                        return self.yield_from(index, item);
                    }
                    if self.channels[index].is_done() {
                        // The producer may have published between the miss
                        // and the done check.
                        if let Some(item) = self.channels[index].try_dequeue() {
                            return self.yield_from(index, item);
                        }
                        self.mark_done(index);
                    }
                }
                index = (index + 1) % count;
            }
            if self.done_count == count {
                return self.end_query();
            }

            // Second pass: decide under each channel's lock, registering
            // for a wakeup where nothing is available yet. Registrations are
            // withdrawn when `registered` drops, on every exit.
            self.consumer_event.reset();
            let mut registered: Vec<WaitRegistration<T>> = Vec::with_capacity(count - self.done_count);
            for _ in 0..count {
                if !self.done[index] {
                    match self.channels[index].try_dequeue_or_wait() {
                        DequeueOutcome::Item(item) => return self.yield_from(index, item),
                        DequeueOutcome::Done => self.mark_done(index),
                        DequeueOutcome::Waiting => registered.push(self.channels[index].wait_registration()),
                    }
                }
                index = (index + 1) % count;
            }
            if self.done_count == count {
                return self.end_query();
            }

            let woke = self.consumer_event.wait(&self.token);
            drop(registered);
            match woke {
                Ok(next) => index = next % count,
                Err(e) => return self.end_canceled(e),
            }
        }
    }
}

impl<T: Send> MergeEnumerator<T> for AsynchronousChannelMergeEnumerator<T> {
    fn move_next(&mut self) -> Result<Option<T>> {
        if self.query_ended {
            return Ok(None);
        }
        if self.channels.is_empty() {
            return self.end_query();
        }
        let index = self.channel_index;
        if !self.done[index] {
            if let Some(item) = self.channels[index].try_dequeue() {
                return self.yield_from(index, item);
            }
        }
        self.move_next_slow()
    }
}

impl<T> Drop for AsynchronousChannelMergeEnumerator<T> {
    fn drop(&mut self) {
        if self.query_ended {
            return;
        }
        // Early dispose: stop producers, unblock them, and wait for all of
        // them before the wakeup event can go away.
        self.group.cancel();
        for channel in &mut self.channels {
            channel.dispose();
        }
        let _ = self.group.query_end(true);
    }
}

impl<T> fmt::Debug for AsynchronousChannelMergeEnumerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsynchronousChannelMergeEnumerator")
            .field("channels", &self.channels.len())
            .field("done", &self.done_count)
            .field("channel_index", &self.channel_index)
            .finish()
    }
}
