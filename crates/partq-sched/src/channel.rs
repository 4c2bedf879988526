//! Bounded single-producer/single-consumer channels.
//!
//! The asynchronous channel moves elements in chunks: the writer batches
//! `chunk_size` elements locally and publishes the batch under the lock, the
//! reader takes a whole chunk at once and serves it without locking. At most
//! `capacity` chunks sit in the queue; a writer facing a full queue blocks
//! until the reader makes room, the reader goes away, or the query is
//! canceled.
//!
//! `SynchronousChannel` is the unbounded counterpart used by stop-and-go
//! spooling, where the consumer only reads after every producer finished.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use partq_core::cancel::CancellationToken;
use partq_core::error::Result;
use partq_core::sync::{IntValueEvent, WAIT_SLICE};

struct QueueState<T> {
    chunks: VecDeque<Vec<T>>,
    done: bool,
    consumer_waiting: bool,
    consumer_closed: bool,
}

struct ChannelShared<T> {
    index: usize,
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    consumer_event: Option<Arc<IntValueEvent>>,
}

impl<T> ChannelShared<T> {
    fn wake_consumer(&self, state: &mut QueueState<T>) {
        if state.consumer_waiting {
            state.consumer_waiting = false;
            if let Some(event) = &self.consumer_event {
                event.set(self.index);
            }
        }
    }
}

/// Create a channel for partition `index`.
///
/// `consumer_event` is set to `index` whenever the producer publishes data or
/// finishes while the consumer is registered as waiting.
pub fn channel<T>(
    index: usize,
    capacity: usize,
    chunk_size: usize,
    consumer_event: Option<Arc<IntValueEvent>>,
    token: CancellationToken,
) -> (ChannelWriter<T>, ChannelReader<T>) {
    let shared = Arc::new(ChannelShared {
        index,
        capacity: capacity.max(1),
        state: Mutex::new(QueueState {
            chunks: VecDeque::new(),
            done: false,
            consumer_waiting: false,
            consumer_closed: false,
        }),
        not_full: Condvar::new(),
        consumer_event,
    });
    let chunk_size = chunk_size.max(1);
    let writer = ChannelWriter {
        shared: Arc::clone(&shared),
        chunk: Vec::with_capacity(chunk_size),
        chunk_size,
        token,
        finished: false,
    };
    let reader = ChannelReader {
        shared,
        chunk: VecDeque::new(),
        disposed: false,
    };
    (writer, reader)
}

/// Outcome of `ChannelReader::try_dequeue_or_wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutcome<T> {
    Item(T),
    /// The producer finished and nothing is left.
    Done,
    /// Nothing available; the reader is now registered for a wakeup.
    Waiting,
}

pub struct ChannelWriter<T> {
    shared: Arc<ChannelShared<T>>,
    chunk: Vec<T>,
    chunk_size: usize,
    token: CancellationToken,
    finished: bool,
}

impl<T> ChannelWriter<T> {
    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn enqueue(&mut self, item: T) -> Result<()> {
        self.chunk.push(item);
        if self.chunk.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Publish the partially filled local chunk, blocking while the queue is
    /// at capacity.
    pub fn flush(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let mut state = self.shared.state.lock();
        while state.chunks.len() >= self.shared.capacity && !state.consumer_closed {
            if let Err(e) = self.token.throw_if_canceled() {
                self.chunk.clear();
                return Err(e);
            }
            self.shared.not_full.wait_for(&mut state, WAIT_SLICE);
        }
        let chunk = std::mem::replace(&mut self.chunk, Vec::with_capacity(self.chunk_size));
        if state.consumer_closed {
            return Ok(());
        }
        state.chunks.push_back(chunk);
        self.shared.wake_consumer(&mut state);
        Ok(())
    }

    /// Flush what is buffered and mark the channel done. Idempotent.
    pub fn set_done(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let flushed = self.flush();
        self.finished = true;
        let mut state = self.shared.state.lock();
        state.done = true;
        self.shared.wake_consumer(&mut state);
        flushed
    }
}

impl<T> Drop for ChannelWriter<T> {
    fn drop(&mut self) {
        // The consumer must never wait on a producer that is gone.
        let _ = self.set_done();
    }
}

impl<T> fmt::Debug for ChannelWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("index", &self.shared.index)
            .field("buffered", &self.chunk.len())
            .field("finished", &self.finished)
            .finish()
    }
}

pub struct ChannelReader<T> {
    shared: Arc<ChannelShared<T>>,
    chunk: VecDeque<T>,
    disposed: bool,
}

impl<T> ChannelReader<T> {
    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn try_dequeue(&mut self) -> Option<T> {
        if let Some(item) = self.chunk.pop_front() {
            return Some(item);
        }
        let next = {
            let mut state = self.shared.state.lock();
            state.chunks.pop_front()
        }?;
        self.shared.not_full.notify_one();
        self.chunk = next.into();
        self.chunk.pop_front()
    }

    /// Like `try_dequeue`, but decided under the producer lock: either an
    /// item, a definitive `Done`, or a registration for the next wakeup.
    pub fn try_dequeue_or_wait(&mut self) -> DequeueOutcome<T> {
        if let Some(item) = self.chunk.pop_front() {
            return DequeueOutcome::Item(item);
        }
        let next = {
            let mut state = self.shared.state.lock();
            match state.chunks.pop_front() {
                Some(chunk) => chunk,
                None if state.done => return DequeueOutcome::Done,
                None => {
                    state.consumer_waiting = true;
                    return DequeueOutcome::Waiting;
                }
            }
        };
        self.shared.not_full.notify_one();
        self.chunk = next.into();
        match self.chunk.pop_front() {
            Some(item) => DequeueOutcome::Item(item),
            None => DequeueOutcome::Waiting,
        }
    }

    /// Guard for a wakeup registration made by `try_dequeue_or_wait`; the
    /// registration is withdrawn when the guard drops.
    pub fn wait_registration(&self) -> WaitRegistration<T> {
        WaitRegistration {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The producer has finished. Items may still be queued.
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().done
    }

    pub fn is_chunk_buffer_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// Drop everything buffered and release a producer blocked on capacity.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.chunk.clear();
        {
            let mut state = self.shared.state.lock();
            state.consumer_closed = true;
            state.consumer_waiting = false;
            state.chunks.clear();
        }
        self.shared.not_full.notify_all();
    }
}

impl<T> Drop for ChannelReader<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> fmt::Debug for ChannelReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("index", &self.shared.index)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Withdraws the reader's wakeup registration on drop.
#[must_use = "the registration is withdrawn as soon as the guard drops"]
pub struct WaitRegistration<T> {
    shared: Arc<ChannelShared<T>>,
}

impl<T> Drop for WaitRegistration<T> {
    fn drop(&mut self) {
        self.shared.state.lock().consumer_waiting = false;
    }
}

impl<T> fmt::Debug for WaitRegistration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitRegistration")
            .field("index", &self.shared.index)
            .finish()
    }
}

/// Unbounded channel filled by one producer and read after it finished.
pub struct SynchronousChannel<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> SynchronousChannel<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        self.items.lock().extend(items);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl<T> Default for SynchronousChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SynchronousChannel<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> fmt::Debug for SynchronousChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronousChannel")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partq_core::cancel::CancellationSource;
    use partq_core::error::QueryError;
    use std::thread;

    #[test]
    fn chunked_items_arrive_in_order() {
        let (mut tx, mut rx) = channel(0, 4, 3, None, CancellationToken::none());
        for i in 0..7 {
            tx.enqueue(i).unwrap();
        }
        // Two full chunks published, one element still buffered by the writer.
        assert_eq!(rx.try_dequeue(), Some(0));
        assert!(!rx.is_chunk_buffer_empty());
        tx.set_done().unwrap();
        let rest: Vec<_> = std::iter::from_fn(|| rx.try_dequeue()).collect();
        assert_eq!(rest, vec![1, 2, 3, 4, 5, 6]);
        assert!(rx.is_done());
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::Done);
    }

    #[test]
    fn waiting_reader_is_woken_with_channel_index() {
        let event = Arc::new(IntValueEvent::new());
        let (mut tx, mut rx) = channel(5, 2, 1, Some(Arc::clone(&event)), CancellationToken::none());
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::<u8>::Waiting);
        let producer = thread::spawn(move || {
            tx.enqueue(9).unwrap();
        });
        assert_eq!(event.wait(&CancellationToken::none()).unwrap(), 5);
        producer.join().unwrap();
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::Item(9));
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::Done);
    }

    #[test]
    fn dropped_registration_suppresses_wakeup() {
        let event = Arc::new(IntValueEvent::new());
        let (mut tx, mut rx) = channel(3, 2, 1, Some(Arc::clone(&event)), CancellationToken::none());
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::<u8>::Waiting);
        drop(rx.wait_registration());
        tx.enqueue(1).unwrap();
        assert_eq!(event.value(), None);

        // A live registration is still woken.
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::Item(1));
        assert_eq!(rx.try_dequeue_or_wait(), DequeueOutcome::Waiting);
        let registration = rx.wait_registration();
        tx.enqueue(2).unwrap();
        assert_eq!(event.value(), Some(3));
        drop(registration);
    }

    #[test]
    fn dropped_writer_marks_done() {
        let (tx, rx) = channel::<u32>(0, 1, 1, None, CancellationToken::none());
        assert!(!rx.is_done());
        drop(tx);
        assert!(rx.is_done());
    }

    #[test]
    fn full_channel_blocks_until_reader_disposes() {
        let (mut tx, mut rx) = channel(0, 1, 1, None, CancellationToken::none());
        tx.enqueue(1).unwrap();
        let producer = thread::spawn(move || {
            // Blocks on capacity until the reader goes away.
            tx.enqueue(2).unwrap();
            tx.enqueue(3).unwrap();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        rx.dispose();
        producer.join().unwrap();
    }

    #[test]
    fn full_channel_unblocks_on_cancel() {
        let source = CancellationSource::new();
        let (mut tx, _rx) = channel(0, 1, 1, None, source.token());
        tx.enqueue(1).unwrap();
        let producer = thread::spawn(move || tx.enqueue(2));
        thread::sleep(std::time::Duration::from_millis(20));
        source.cancel();
        assert_eq!(producer.join().unwrap(), Err(QueryError::Canceled));
    }

    #[test]
    fn synchronous_channel_collects() {
        let ch = SynchronousChannel::new();
        let other = ch.clone();
        other.extend([1]);
        other.extend([2, 3]);
        assert_eq!(ch.len(), 3);
        assert_eq!(ch.take_all(), vec![1, 2, 3]);
        assert!(ch.is_empty());
    }
}
