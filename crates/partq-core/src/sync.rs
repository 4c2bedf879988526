//! Cross-partition synchronization primitives.
//!
//! These are the only pieces of state that partitions share:
//! - `SharedFlag`: a one-way boolean (false -> true, never back). Relaxed
//!   ordering is enough because readers only use it to stop early.
//! - `Shared<T>`: a reference-counted, mutex-guarded cell.
//! - `CountdownEvent`: a one-shot barrier sized to the partition count.
//! - `IntValueEvent`: a single-slot wakeup carrying the index of whichever
//!   producer woke the consumer.
//!
//! Blocking waits take a `CancellationToken` and re-check it every
//! `WAIT_SLICE`, so a canceled query never leaves a waiter parked forever.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::cancel::CancellationToken;
use crate::error::{QueryError, Result};

/// Upper bound on how long a blocked waiter goes without polling its token.
pub const WAIT_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Default)]
pub struct SharedFlag {
    flag: Arc<AtomicBool>,
}

impl SharedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

pub struct Shared<T> {
    cell: Arc<Mutex<T>>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(Mutex::new(value)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.cell.lock()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.cell.lock()).finish()
    }
}

struct CountdownInner {
    remaining: Mutex<usize>,
    released: Condvar,
}

/// One-shot barrier: constructed with the exact number of participants,
/// signaled once by each, released when the count reaches zero.
#[derive(Clone)]
pub struct CountdownEvent {
    inner: Arc<CountdownInner>,
}

impl CountdownEvent {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(CountdownInner {
                remaining: Mutex::new(count),
                released: Condvar::new(),
            }),
        }
    }

    pub fn signal(&self) -> Result<()> {
        let mut remaining = self.inner.remaining.lock();
        if *remaining == 0 {
            return Err(QueryError::invariant(
                "countdown event signaled more times than its initial count",
            ));
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.inner.released.notify_all();
        }
        Ok(())
    }

    /// Signal when the returned guard drops, including during unwinding.
    pub fn signal_on_drop(&self) -> CountdownSignal<'_> {
        CountdownSignal { event: self }
    }

    pub fn wait(&self, token: &CancellationToken) -> Result<()> {
        let mut remaining = self.inner.remaining.lock();
        while *remaining > 0 {
            token.throw_if_canceled()?;
            self.inner.released.wait_for(&mut remaining, WAIT_SLICE);
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        *self.inner.remaining.lock()
    }

    pub fn is_set(&self) -> bool {
        self.remaining() == 0
    }
}

impl fmt::Debug for CountdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownEvent")
            .field("remaining", &self.remaining())
            .finish()
    }
}

pub struct CountdownSignal<'a> {
    event: &'a CountdownEvent,
}

impl Drop for CountdownSignal<'_> {
    fn drop(&mut self) {
        // An over-signal is a bug upstream; nothing useful to do with it here.
        let _ = self.event.signal();
    }
}

/// Single-slot event holding the index of the channel that woke the consumer.
#[derive(Default)]
pub struct IntValueEvent {
    value: Mutex<Option<usize>>,
    ready: Condvar,
}

impl IntValueEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` and wake the waiter. A later `set` overwrites an earlier
    /// one that has not been consumed yet; any index is a valid restart point.
    pub fn set(&self, value: usize) {
        let mut slot = self.value.lock();
        *slot = Some(value);
        self.ready.notify_one();
    }

    /// Block until set, then return the stored index.
    pub fn wait(&self, token: &CancellationToken) -> Result<usize> {
        let mut slot = self.value.lock();
        loop {
            if let Some(v) = *slot {
                return Ok(v);
            }
            token.throw_if_canceled()?;
            self.ready.wait_for(&mut slot, WAIT_SLICE);
        }
    }

    pub fn value(&self) -> Option<usize> {
        *self.value.lock()
    }

    pub fn reset(&self) {
        *self.value.lock() = None;
    }
}

impl fmt::Debug for IntValueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntValueEvent")
            .field("value", &self.value())
            .finish()
    }
}
