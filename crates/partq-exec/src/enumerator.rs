//! Consumer-facing enumerator.
//!
//! Two ways to read it, not to be mixed on one instance:
//! - `move_next` / `current`, mirroring a classic cursor;
//! - `Iterator<Item = Result<T>>`, which moves each element out.

use std::fmt;

use partq_core::error::{QueryError, Result};

use crate::merge::MergeEnumerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Active,
    Finished,
}

pub struct QueryEnumerator<T> {
    merge: Box<dyn MergeEnumerator<T>>,
    current: Option<T>,
    phase: Phase,
}

impl<T> QueryEnumerator<T> {
    pub fn new(merge: Box<dyn MergeEnumerator<T>>) -> Self {
        Self {
            merge,
            current: None,
            phase: Phase::NotStarted,
        }
    }

    /// Advance to the next element. After `Ok(false)` or an error the
    /// enumerator stays finished.
    pub fn move_next(&mut self) -> Result<bool> {
        if self.phase == Phase::Finished {
            return Ok(false);
        }
        match self.merge.move_next() {
            Ok(Some(item)) => {
                self.current = Some(item);
                self.phase = Phase::Active;
                Ok(true)
            }
            Ok(None) => {
                self.current = None;
                self.phase = Phase::Finished;
                Ok(false)
            }
            Err(e) => {
                self.current = None;
                self.phase = Phase::Finished;
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Result<&T> {
        match self.phase {
            Phase::NotStarted => Err(QueryError::EnumerationNotStarted),
            Phase::Finished => Err(QueryError::EnumerationFinished),
            Phase::Active => self
                .current
                .as_ref()
                .ok_or_else(|| QueryError::invariant("current element already moved out")),
        }
    }

    /// Move the current element out. Later `current` calls report an
    /// invariant violation until the next advance.
    pub fn take_current(&mut self) -> Result<T> {
        self.current()?;
        self.current
            .take()
            .ok_or_else(|| QueryError::invariant("current element already moved out"))
    }
}

impl<T> Iterator for QueryEnumerator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        match self.move_next() {
            Ok(true) => self.current.take().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T> fmt::Debug for QueryEnumerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEnumerator")
            .field("phase", &self.phase)
            .finish()
    }
}
