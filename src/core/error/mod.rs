use thiserror::Error;

/// Result alias for hand-off queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Failures surfaced by the queue. Empty and finished states are not errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The cancellation token fired while the call waited for the lock.
    /// Nothing was mutated.
    #[error("operation cancelled while waiting for the queue lock")]
    Cancelled,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}
