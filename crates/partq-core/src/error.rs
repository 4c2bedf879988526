use thiserror::Error;

/// Canonical result for every partq crate.
pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("the query was canceled")]
    Canceled,

    #[error("enumeration has not started: call move_next first")]
    EnumerationNotStarted,

    #[error("enumeration already finished")]
    EnumerationFinished,

    #[error("operator '{0}' cannot be evaluated sequentially")]
    SequentialNotSupported(&'static str),

    #[error("index {index} is out of range")]
    IndexOutOfRange { index: usize },

    #[error("sequence contains no matching element")]
    NoMatch,

    // A partition task failed (delegate panic or propagated error). Surfaced
    // to the consumer at query end.
    #[error("partition task {task} failed: {message}")]
    TaskFailed { task: usize, message: String },

    #[error("failed to schedule partition task: {0}")]
    Schedule(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl QueryError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, QueryError::Canceled)
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        QueryError::Invariant(msg.into())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Config(e.to_string())
    }
}
