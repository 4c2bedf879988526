//! Scheduler seam: something that runs a boxed unit of partition work.
//!
//! Partitions of one query may block on each other (barriers, full
//! channels), so a scheduler must be able to run every task of a query
//! concurrently. Fixed-size pools smaller than the partition count do not
//! satisfy that and can deadlock.

use std::thread;

use partq_core::error::{QueryError, Result};

pub type Work = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskScheduler: Send + Sync + 'static {
    /// Human-readable scheduler name (stable).
    fn name(&self) -> &'static str;

    /// Start `work` without waiting for it.
    fn spawn(&self, task_name: String, work: Work) -> Result<()>;
}

/// One OS thread per task.
#[derive(Debug, Clone, Default)]
pub struct ThreadScheduler {
    stack_size: Option<usize>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl TaskScheduler for ThreadScheduler {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn spawn(&self, task_name: String, work: Work) -> Result<()> {
        let mut builder = thread::Builder::new().name(task_name);
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        builder
            .spawn(work)
            .map(|_| ())
            .map_err(|e| QueryError::Schedule(e.to_string()))
    }
}

/// Runs tasks on tokio's blocking pool, which grows on demand and so keeps
/// every partition of a query runnable at once.
#[cfg(feature = "async-scheduler")]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "async-scheduler")]
impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| QueryError::Schedule(e.to_string()))
    }
}

#[cfg(feature = "async-scheduler")]
impl TaskScheduler for TokioScheduler {
    fn name(&self) -> &'static str {
        "tokio-blocking"
    }

    fn spawn(&self, _task_name: String, work: Work) -> Result<()> {
        // Detached; completion is tracked by the task group, not the handle.
        drop(self.handle.spawn_blocking(work));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn thread_scheduler_names_its_threads() {
        let (tx, rx) = mpsc::channel();
        ThreadScheduler::new()
            .with_stack_size(256 * 1024)
            .spawn(
                "partq-test".into(),
                Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send(name).unwrap();
                }),
            )
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("partq-test"));
    }

    #[cfg(feature = "async-scheduler")]
    #[tokio::test(flavor = "multi_thread")]
    async fn tokio_scheduler_runs_blocking_work() {
        let (tx, rx) = mpsc::channel();
        let scheduler = TokioScheduler::current().unwrap();
        assert_eq!(scheduler.name(), "tokio-blocking");
        scheduler
            .spawn("t".into(), Box::new(move || tx.send(7).unwrap()))
            .unwrap();
        let got = tokio::task::spawn_blocking(move || rx.recv().unwrap())
            .await
            .unwrap();
        assert_eq!(got, 7);
    }
}
