use thiserror::Error;
use twinsync_retry::RetryError;
use twinsync_store::StoreError;
use twinsync_types::{EntityType, SourceId, TypeError};

#[derive(Debug, Error)]
pub enum SyncError {
    /// An update arrived before the entity's mapping exists.
    #[error("no mapping for {entity_type} {source_id}")]
    MissingMapping {
        entity_type: EntityType,
        source_id: SourceId,
    },

    #[error("source entity {entity_type} {source_id} not found")]
    SourceNotFound {
        entity_type: EntityType,
        source_id: SourceId,
    },

    #[error("no handler registered for entity type {0}")]
    UnknownEntityType(EntityType),

    #[error("invalid event: {0}")]
    Validation(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("event processor is shut down")]
    ShutDown,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("retry queue error: {0}")]
    Retry(#[from] RetryError),
}

impl From<TypeError> for SyncError {
    fn from(e: TypeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl SyncError {
    /// Whether running the whole operation again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MissingMapping { .. } => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Malformed input that no retry will fix.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnknownEntityType(_) | Self::Translation(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
