//! Task-group state shared by every partition task of one query.
//!
//! The group counts outstanding tasks, keeps the first real failure, and
//! trips the query's internal cancellation when a task fails so siblings
//! stop early. The consumer calls `query_end` to wait for all tasks and
//! surface whatever went wrong.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use partq_core::cancel::CancellationState;
use partq_core::error::{QueryError, Result};
use partq_core::id::QueryId;

use crate::scheduler::{TaskScheduler, Work};

struct GroupInner {
    query_id: QueryId,
    cancellation: CancellationState,
    pending: Mutex<usize>,
    all_finished: Condvar,
    failure: Mutex<Option<QueryError>>,
}

impl GroupInner {
    fn finish_task(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.all_finished.notify_all();
        }
    }

    fn record_failure(&self, task: usize, error: QueryError) {
        let canceled = error.is_canceled();
        {
            let mut slot = self.failure.lock();
            let replace = match slot.as_ref() {
                None => true,
                Some(existing) => existing.is_canceled() && !canceled,
            };
            if replace {
                #[cfg(feature = "tracing")]
                tracing::debug!(query = %self.query_id, task, error = %error, "partition task failed");
                *slot = Some(error);
            }
        }
        #[cfg(not(feature = "tracing"))]
        let _ = task;
        if !canceled {
            self.cancellation.cancel_internal();
        }
    }
}

#[derive(Clone)]
pub struct QueryTaskGroupState {
    inner: Arc<GroupInner>,
}

impl QueryTaskGroupState {
    pub fn new(cancellation: CancellationState, query_id: QueryId) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                query_id,
                cancellation,
                pending: Mutex::new(0),
                all_finished: Condvar::new(),
                failure: Mutex::new(None),
            }),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.inner.query_id
    }

    /// Run `work` as task `task_index` of this group.
    ///
    /// Errors returned by `work` and panics raised inside it are recorded as
    /// the group's failure; they never unwind into the scheduler.
    pub fn spawn<F>(&self, scheduler: &dyn TaskScheduler, task_index: usize, work: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        *self.inner.pending.lock() += 1;

        let inner = Arc::clone(&self.inner);
        let job: Work = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(QueryError::TaskFailed {
                    task: task_index,
                    message: panic_message(payload.as_ref()),
                }),
            };
            if let Some(e) = failure {
                inner.record_failure(task_index, e);
            }
            inner.finish_task();
        });

        let name = format!("partq-q{}-t{}", self.inner.query_id.get(), task_index);
        if let Err(e) = scheduler.spawn(name, job) {
            self.inner.finish_task();
            self.inner.record_failure(task_index, e.clone());
            return Err(e);
        }
        Ok(())
    }

    pub fn record_failure(&self, task: usize, error: QueryError) {
        self.inner.record_failure(task, error);
    }

    /// Trip the internal cancellation source (early dispose, failure).
    pub fn cancel(&self) {
        self.inner.cancellation.cancel_internal();
    }

    pub fn pending_tasks(&self) -> usize {
        *self.inner.pending.lock()
    }

    /// Block until every spawned task has finished. Tasks poll the merged
    /// token, so after `cancel` this returns promptly.
    pub fn wait(&self) {
        let mut pending = self.inner.pending.lock();
        while *pending > 0 {
            self.inner.all_finished.wait(&mut pending);
        }
    }

    /// Wait for all tasks, then surface the outcome.
    ///
    /// A real task failure always wins. Cancellation is reported only when
    /// the caller's token tripped and the end of the query is not the result
    /// of the consumer disposing it early.
    pub fn query_end(&self, user_initiated_dispose: bool) -> Result<()> {
        self.wait();
        let failure = self.inner.failure.lock().clone();
        match failure {
            Some(e) if !e.is_canceled() => Err(e),
            _ if user_initiated_dispose => Ok(()),
            _ if self.inner.cancellation.is_externally_canceled() => Err(QueryError::Canceled),
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for QueryTaskGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTaskGroupState")
            .field("query_id", &self.inner.query_id)
            .field("pending", &self.pending_tasks())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
