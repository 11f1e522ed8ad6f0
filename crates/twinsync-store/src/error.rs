use std::time::Duration;

use thiserror::Error;
use twinsync_types::Mapping;

/// Failures reported by the source system, the target system, or the
/// mapping store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A mapping for this source id already exists.
    #[error("mapping conflict: {} is already mapped to {}", .existing.source_id, .existing.target_id)]
    Conflict { existing: Box<Mapping> },

    /// The remote rejected the request as malformed. Never retried.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Network or 5xx-class failure. Safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The call did not complete within its budget.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store is unusable (e.g. a poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn conflict(existing: Mapping) -> Self {
        Self::Conflict {
            existing: Box::new(existing),
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_) | Self::Unavailable(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
