use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;
use twinsync_sync::ProcessOutcome;
use twinsync_types::{EntityType, EventEnvelope, SourceId};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

fn parse_entity_type(raw: String) -> ServerResult<EntityType> {
    EntityType::parse(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn parse_source_id(raw: String) -> ServerResult<SourceId> {
    SourceId::parse(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "twinsync",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ingest one change event and process it to completion.
///
/// Dead-lettered events are answered with 202: the event was taken, and
/// now sits with the operators.
pub async fn event_handler(
    State(state): State<AppState>,
    Json(event): Json<EventEnvelope>,
) -> ServerResult<Response> {
    let outcome = state.processor().process(event).await?;
    let status = match outcome {
        ProcessOutcome::Synced(_) => StatusCode::OK,
        ProcessOutcome::DeadLettered { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)).into_response())
}

/// Run a full reconciliation sweep for one entity type.
pub async fn reconcile_handler(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ServerResult<Json<Value>> {
    let entity_type = parse_entity_type(entity)?;
    let check = Arc::new(state.entity_check(&entity_type)?);
    let pages = state.pages(&entity_type);
    let report = state
        .engine()
        .sweep(entity_type.as_str(), &pages, check)
        .await?;
    Ok(Json(json!({
        "summary": report.summary(),
        "report": report,
    })))
}

/// Check a single source entity. 204 when it matches its target.
pub async fn check_one_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ServerResult<Response> {
    let entity_type = parse_entity_type(entity)?;
    let source_id = parse_source_id(id)?;
    let check = state.entity_check(&entity_type)?;
    match state.engine().check_one(&check, &source_id).await? {
        Some(mismatch) => Ok(Json(mismatch).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Force the create path for one source entity.
pub async fn repair_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let entity_type = parse_entity_type(entity)?;
    let source_id = parse_source_id(id)?;
    let target_id = state.coordinator().repair(&entity_type, &source_id).await?;
    info!(%entity_type, %source_id, %target_id, "repaired");
    Ok(Json(json!({
        "entityType": entity_type,
        "sourceId": source_id,
        "targetId": target_id,
    })))
}
