#![forbid(unsafe_code)]
//! partq-core: shared types for the partitioned query engine.
//!
//! Design intent:
//! - Leaf crate: no threads are spawned here and no channels live here.
//! - Everything a partition enumerator touches across partition boundaries
//!   (flags, barriers, wakeup slots, cancellation) is defined here so the
//!   operator and exec crates agree on one set of primitives.

pub mod cancel;
pub mod config;
pub mod error;
pub mod id;
pub mod ordinal;
pub mod prelude;
pub mod stream;
pub mod sync;

pub use error::{QueryError, Result};
