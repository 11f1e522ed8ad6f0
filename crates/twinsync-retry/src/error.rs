use thiserror::Error;
use twinsync_store::StoreError;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("retry queue is closed")]
    QueueClosed,

    #[error("retry queue is full")]
    QueueFull,

    #[error("dead-letter sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type RetryResult<T> = Result<T, RetryError>;
