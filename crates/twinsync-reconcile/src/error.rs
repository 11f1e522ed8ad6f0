use thiserror::Error;
use twinsync_diff::DiffError;
use twinsync_store::StoreError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The sweep hit its page-error ceiling and was abandoned.
    #[error("sweep aborted after {page_errors} page errors (ceiling {ceiling}); last: {last_error}")]
    TooManyPageErrors {
        page_errors: u32,
        ceiling: u32,
        last_error: String,
    },

    #[error("invalid reconciliation config: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
