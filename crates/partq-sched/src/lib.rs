#![forbid(unsafe_code)]
//! partq-sched: the task substrate partition work runs on.
//!
//! Responsibilities:
//! - Hand partition work to a `TaskScheduler` (threads by default).
//! - Track a query's tasks as one group: completion, first failure,
//!   internal cancellation (`QueryTaskGroupState`).
//! - Bridge producers and the consumer with channels.
//! - Spool partitioned streams into channels (pipelined, stop-and-go) or
//!   run them purely for effect.
//!
//! The operators and exec crates never spawn threads themselves.

pub mod channel;
pub mod scheduler;
pub mod settings;
pub mod spooling;
pub mod task;

pub use channel::{channel, ChannelReader, ChannelWriter, DequeueOutcome, SynchronousChannel, WaitRegistration};
#[cfg(feature = "async-scheduler")]
pub use scheduler::TokioScheduler;
pub use scheduler::{TaskScheduler, ThreadScheduler, Work};
pub use settings::QuerySettings;
pub use task::QueryTaskGroupState;
