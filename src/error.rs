use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decoding(err.to_string())
    }
}

/// Failure reported by an event handler.
///
/// The variant tells the gate whether the handler may have left a durable
/// side effect behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Nothing durable was written; redelivery may safely run the handler again.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// A durable write may have happened before the failure.
    #[error("Commit uncertain: {0}")]
    CommitUncertain(String),

    /// The handler could not classify the failure.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl HandlerError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn commit_uncertain(reason: impl Into<String>) -> Self {
        Self::CommitUncertain(reason.into())
    }

    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::Unexpected(reason.into())
    }

    /// Only transient failures are known to be safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        HandlerError::Unexpected(err.to_string())
    }
}
