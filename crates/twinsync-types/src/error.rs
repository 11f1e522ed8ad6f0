use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown mapping type: {0}")]
    UnknownMappingType(String),
}
