use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use twinsync_reconcile::ReconcileError;
use twinsync_sync::SyncError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_)
            | Self::Sync(SyncError::SourceNotFound { .. })
            | Self::Sync(SyncError::UnknownEntityType(_)) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Sync(SyncError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Sync(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Reconcile(ReconcileError::TooManyPageErrors { .. }) => StatusCode::BAD_GATEWAY,
            Self::Reconcile(ReconcileError::Store(e)) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinsync_types::{EntityType, SourceId};

    #[test]
    fn maps_errors_to_status_codes() {
        let gone = ServerError::from(SyncError::SourceNotFound {
            entity_type: EntityType::from("contact"),
            source_id: SourceId::from(1),
        });
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let aborted = ServerError::from(ReconcileError::TooManyPageErrors {
            page_errors: 31,
            ceiling: 30,
            last_error: "down".into(),
        });
        assert_eq!(aborted.status(), StatusCode::BAD_GATEWAY);
    }
}
