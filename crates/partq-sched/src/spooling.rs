//! Spooling: run every partition of a stream as its own task.
//!
//! Three shapes:
//! - pipelined: each partition pushes into its `ChannelWriter` as it goes;
//!   the consumer reads concurrently;
//! - stop-and-go: each partition collects into a `SynchronousChannel`; the
//!   consumer reads after the group has finished;
//! - for-all: partitions are drained purely for their side effects.
//!
//! Every task disposes its enumerator on exit, including on error or
//! unwind.

use partq_core::cancel::{should_poll, CancellationToken};
use partq_core::error::{QueryError, Result};
use partq_core::stream::{BoxedEnumerator, PartitionedStream};

use crate::channel::{ChannelWriter, SynchronousChannel};
use crate::settings::QuerySettings;
use crate::task::QueryTaskGroupState;

struct DisposeOnDrop<T, K>(BoxedEnumerator<T, K>);

impl<T, K> Drop for DisposeOnDrop<T, K> {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Pull `source` to exhaustion, handing each pair to `sink`.
pub fn drain<T, K, F>(source: &mut BoxedEnumerator<T, K>, token: &CancellationToken, mut sink: F) -> Result<()>
where
    F: FnMut(T, K) -> Result<()>,
{
    let mut i = 0usize;
    loop {
        if should_poll(i) {
            token.throw_if_canceled()?;
        }
        i = i.wrapping_add(1);
        match source.move_next()? {
            Some((item, key)) => sink(item, key)?,
            None => return Ok(()),
        }
    }
}

/// Start one task per partition, each feeding the writer with the same index.
pub fn spool_pipeline<T, K>(
    group: &QueryTaskGroupState,
    settings: &QuerySettings,
    stream: PartitionedStream<T, K>,
    writers: Vec<ChannelWriter<T>>,
) -> Result<()>
where
    T: Send + 'static,
    K: Send + 'static,
{
    let partitions = stream.into_partitions();
    if partitions.len() != writers.len() {
        return Err(QueryError::invariant(format!(
            "{} partitions but {} channels",
            partitions.len(),
            writers.len()
        )));
    }
    for (index, (source, mut writer)) in partitions.into_iter().zip(writers).enumerate() {
        let token = settings.merged_token().clone();
        group.spawn(settings.scheduler(), index, move || {
            let mut source = DisposeOnDrop(source);
            drain(&mut source.0, &token, |item, _| writer.enqueue(item))?;
            writer.set_done()
        })?;
    }
    Ok(())
}

/// Start one task per partition collecting `(element, key)` pairs. The
/// returned channels are complete once the group has been waited on.
pub fn spool_stop_and_go<T, K>(
    group: &QueryTaskGroupState,
    settings: &QuerySettings,
    stream: PartitionedStream<T, K>,
) -> Result<Vec<SynchronousChannel<(T, K)>>>
where
    T: Send + 'static,
    K: Send + 'static,
{
    let partitions = stream.into_partitions();
    let mut channels = Vec::with_capacity(partitions.len());
    for (index, source) in partitions.into_iter().enumerate() {
        let channel = SynchronousChannel::new();
        channels.push(channel.clone());
        let token = settings.merged_token().clone();
        group.spawn(settings.scheduler(), index, move || {
            let mut source = DisposeOnDrop(source);
            let mut local = Vec::new();
            drain(&mut source.0, &token, |item, key| {
                local.push((item, key));
                Ok(())
            })?;
            channel.extend(local);
            Ok(())
        })?;
    }
    Ok(channels)
}

/// Start one task per partition that discards everything it pulls.
pub fn spool_for_all<T, K>(
    group: &QueryTaskGroupState,
    settings: &QuerySettings,
    stream: PartitionedStream<T, K>,
) -> Result<()>
where
    T: Send + 'static,
    K: Send + 'static,
{
    for (index, source) in stream.into_partitions().into_iter().enumerate() {
        let token = settings.merged_token().clone();
        group.spawn(settings.scheduler(), index, move || {
            let mut source = DisposeOnDrop(source);
            drain(&mut source.0, &token, |_, _| Ok(()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use partq_core::config::QueryConfig;
    use partq_core::ordinal::OrdinalIndexState;
    use partq_core::stream::{default_comparer, QueryOperatorEnumerator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Range {
        next: usize,
        end: usize,
        disposed: Arc<AtomicUsize>,
    }

    impl QueryOperatorEnumerator<usize, usize> for Range {
        fn move_next(&mut self) -> Result<Option<(usize, usize)>> {
            if self.next == self.end {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some((self.next - 1, self.next - 1)))
        }

        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stream(bounds: &[(usize, usize)], disposed: &Arc<AtomicUsize>) -> PartitionedStream<usize, usize> {
        let partitions = bounds
            .iter()
            .map(|&(next, end)| {
                Box::new(Range {
                    next,
                    end,
                    disposed: Arc::clone(disposed),
                }) as BoxedEnumerator<usize, usize>
            })
            .collect();
        PartitionedStream::new(partitions, default_comparer(), OrdinalIndexState::Indexible)
    }

    fn setup() -> (QuerySettings, QueryTaskGroupState) {
        let settings = QuerySettings::new(QueryConfig::default()).with_per_execution_state();
        let group = QueryTaskGroupState::new(settings.cancellation().clone(), settings.query_id());
        (settings, group)
    }

    #[test]
    fn stop_and_go_collects_every_partition() {
        let (settings, group) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        let channels = spool_stop_and_go(&group, &settings, stream(&[(0, 3), (3, 5)], &disposed)).unwrap();
        group.query_end(false).unwrap();
        let collected: Vec<Vec<(usize, usize)>> = channels.iter().map(|c| c.take_all()).collect();
        assert_eq!(collected, vec![vec![(0, 0), (1, 1), (2, 2)], vec![(3, 3), (4, 4)]]);
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pipeline_fills_and_closes_channels() {
        let (settings, group) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        let (writers, mut readers): (Vec<_>, Vec<_>) = (0..2)
            .map(|i| channel(i, 8, 2, None, settings.merged_token().clone()))
            .unzip();
        spool_pipeline(&group, &settings, stream(&[(0, 4), (10, 11)], &disposed), writers).unwrap();
        group.query_end(false).unwrap();
        let first: Vec<_> = std::iter::from_fn(|| readers[0].try_dequeue()).collect();
        let second: Vec<_> = std::iter::from_fn(|| readers[1].try_dequeue()).collect();
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(second, vec![10]);
        assert!(readers.iter().all(|r| r.is_done()));
    }

    #[test]
    fn mismatched_channel_count_is_rejected() {
        let (settings, group) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        let err = spool_pipeline::<usize, usize>(&group, &settings, stream(&[(0, 1)], &disposed), Vec::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::Invariant(_)));
    }
}
