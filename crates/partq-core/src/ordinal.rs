//! Ordinal index states: how far an operator's output keys can be trusted.
//!
//! The lattice runs worst to best:
//! `Shuffled < Increasing < Correct < Indexible`.
//!
//! - `Shuffled`: keys carry the logical order but a partition may emit them
//!   in any order.
//! - `Increasing`: keys are non-decreasing within a partition, possibly with
//!   gaps (e.g. after a filter).
//! - `Correct`: keys are exactly the logical positions `0..n`.
//! - `Indexible`: `Correct`, and the results can also be addressed randomly.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrdinalIndexState {
    Shuffled,
    Increasing,
    Correct,
    Indexible,
}

impl OrdinalIndexState {
    /// True when `self` gives weaker guarantees than `required`.
    pub fn is_worse_than(self, required: OrdinalIndexState) -> bool {
        self < required
    }
}

impl fmt::Display for OrdinalIndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrdinalIndexState::Shuffled => "shuffled",
            OrdinalIndexState::Increasing => "increasing",
            OrdinalIndexState::Correct => "correct",
            OrdinalIndexState::Indexible => "indexible",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::OrdinalIndexState::*;

    #[test]
    fn lattice_order() {
        assert!(Shuffled.is_worse_than(Increasing));
        assert!(Increasing.is_worse_than(Correct));
        assert!(Correct.is_worse_than(Indexible));
        assert!(!Indexible.is_worse_than(Correct));
        assert!(!Correct.is_worse_than(Correct));
    }
}
