//! Cooperative cancellation.
//!
//! A `CancellationSource` owns a one-way flag; `CancellationToken`s observe
//! one or more flags. Each query execution merges the caller's external
//! token with an internal source the engine trips on task failure or early
//! dispose. Tight loops poll the merged token every `POLL_INTERVAL + 1`
//! iterations (`i & POLL_INTERVAL == 0`).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QueryError, Result};

/// Mask for loop counters: poll when `counter & POLL_INTERVAL == 0`.
pub const POLL_INTERVAL: usize = 63;

/// True when a loop at iteration `counter` should poll its token.
#[inline]
pub fn should_poll(counter: usize) -> bool {
    counter & POLL_INTERVAL == 0
}

#[derive(Debug, Clone, Default)]
pub struct CancellationSource {
    flag: Arc<AtomicBool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            flags: vec![Arc::clone(&self.flag)],
        }
    }
}

/// Read side of one or more cancellation sources. The default token can
/// never be canceled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flags: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn none() -> Self {
        Self::default()
    }

    /// A token that trips as soon as any of `tokens` trips.
    pub fn linked(tokens: &[&CancellationToken]) -> Self {
        let flags = tokens
            .iter()
            .flat_map(|t| t.flags.iter().cloned())
            .collect();
        Self { flags }
    }

    pub fn is_canceled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::Acquire))
    }

    pub fn throw_if_canceled(&self) -> Result<()> {
        if self.is_canceled() {
            Err(QueryError::Canceled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("sources", &self.flags.len())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// External + internal cancellation for one query execution.
#[derive(Debug, Clone)]
pub struct CancellationState {
    external: CancellationToken,
    internal: CancellationSource,
    merged: CancellationToken,
}

impl CancellationState {
    pub fn new(external: CancellationToken) -> Self {
        let internal = CancellationSource::new();
        let merged = CancellationToken::linked(&[&external, &internal.token()]);
        Self {
            external,
            internal,
            merged,
        }
    }

    /// Same external token, fresh internal source.
    pub fn renew(&self) -> Self {
        Self::new(self.external.clone())
    }

    pub fn external_token(&self) -> &CancellationToken {
        &self.external
    }

    pub fn merged_token(&self) -> &CancellationToken {
        &self.merged
    }

    pub fn cancel_internal(&self) {
        #[cfg(feature = "tracing")]
        tracing::trace!(already = self.internal.is_canceled(), "internal cancellation requested");
        self.internal.cancel();
    }

    pub fn is_internally_canceled(&self) -> bool {
        self.internal.is_canceled()
    }

    pub fn is_externally_canceled(&self) -> bool {
        self.external.is_canceled()
    }
}

impl Default for CancellationState {
    fn default() -> Self {
        Self::new(CancellationToken::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_token_observes_both_sides() {
        let user = CancellationSource::new();
        let state = CancellationState::new(user.token());
        assert!(!state.merged_token().is_canceled());

        state.cancel_internal();
        assert!(state.merged_token().is_canceled());
        assert!(!state.is_externally_canceled());

        let renewed = state.renew();
        assert!(!renewed.merged_token().is_canceled());
        user.cancel();
        assert!(renewed.merged_token().is_canceled());
        assert_eq!(
            renewed.merged_token().throw_if_canceled(),
            Err(QueryError::Canceled)
        );
    }

    #[test]
    fn poll_cadence() {
        let polls = (0..256).filter(|i| should_poll(*i)).count();
        assert_eq!(polls, 4);
    }
}
