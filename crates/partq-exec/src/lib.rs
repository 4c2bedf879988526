#![forbid(unsafe_code)]
//! partq-exec: the consumer side of a query.
//!
//! `QueryExecutor` opens an operator chain, picks a spooling shape from the
//! merge options and the chain's ordering needs, and hands back a
//! `QueryEnumerator` over the merged output. Aggregates (`element_at`,
//! `last`, `for_all`) are thin drivers on top of it.

pub mod enumerator;
pub mod executor;
pub mod merge;
pub mod metrics;

pub use enumerator::QueryEnumerator;
pub use executor::QueryExecutor;
pub use merge::{AsynchronousChannelMergeEnumerator, MergeEnumerator, SynchronousChannelMergeEnumerator};
