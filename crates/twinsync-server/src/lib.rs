//! HTTP surface for twinsync.
//!
//! Exposes event ingestion, on-demand reconciliation sweeps, single-entity
//! checks and manual repair over a small JSON API.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::TwinsyncServer;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;
    use twinsync_diff::{DiffSchema, Differ, FieldRule, Normalizer};
    use twinsync_reconcile::{ReconcileConfig, ReconciliationEngine};
    use twinsync_retry::{retry_queue, InMemoryDeadLetters};
    use twinsync_store::{InMemoryMappingStore, InMemorySystem};
    use twinsync_sync::{EntityHandler, EventProcessor, HandlerRegistry, SyncConfig, SyncCoordinator};
    use twinsync_types::{EntityType, Mapping, MappingType, SourceId, TargetId};

    struct TestApp {
        source: Arc<InMemorySystem>,
        target: Arc<InMemorySystem>,
        mappings: Arc<InMemoryMappingStore>,
        router: Router,
    }

    fn contact() -> EntityType {
        EntityType::from("contact")
    }

    fn app() -> TestApp {
        let source = Arc::new(InMemorySystem::new());
        let target = Arc::new(InMemorySystem::starting_at(7));
        let mappings = Arc::new(InMemoryMappingStore::new());
        let (queue, _rx) = retry_queue(8);
        let dead_letters = Arc::new(InMemoryDeadLetters::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            source.clone(),
            target.clone(),
            mappings.clone(),
            Arc::new(queue),
            dead_letters.clone(),
            HandlerRegistry::new().with(EntityHandler::identity("contact")),
            SyncConfig::default(),
        ));
        let processor = EventProcessor::new(coordinator, dead_letters);
        let differ = Differ::new(DiffSchema::new(
            "contact",
            vec![FieldRule::scalar("name", Normalizer::text())],
        ))
        .unwrap();
        let engine = ReconciliationEngine::new(ReconcileConfig {
            page_size: 2,
            ..ReconcileConfig::default()
        })
        .unwrap();
        let state = AppState::new(
            processor,
            engine,
            source.clone(),
            target.clone(),
            mappings.clone(),
            HashMap::from([(contact(), differ)]),
        );
        let router = TwinsyncServer::new(ServerConfig::default(), state).router();
        TestApp {
            source,
            target,
            mappings,
            router,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn mirror(app: &TestApp, id: u64, name: &str) {
        app.source.insert(&contact(), id, json!({ "name": name }));
        app.target.insert(&contact(), id + 100, json!({ "name": name }));
        app.mappings.seed(Mapping::new(
            contact(),
            SourceId::from(id),
            TargetId::from(id + 100),
            MappingType::Migrated,
        ));
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = app();
        let (status, body) = send(&app.router, "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_event_is_synced() {
        let app = app();
        app.source.insert(&contact(), 12345, json!({ "name": "Ann" }));
        let event = json!({
            "eventType": "CREATED",
            "origin": "SOURCE",
            "entity": { "entityType": "contact", "sourceId": "12345" }
        });
        let (status, body) = send(&app.router, "POST", "/v1/events", Some(event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "synced");
        assert_eq!(body["outcome"], "created");
        assert_eq!(body["targetId"], "7");

        let (_, again) = send(&app.router, "POST", "/v1/events", Some(event)).await;
        assert_eq!(again["outcome"], "duplicate");
    }

    #[tokio::test]
    async fn invalid_event_is_accepted_into_dead_letters() {
        let app = app();
        let event = json!({
            "eventType": "UPDATED",
            "origin": "SOURCE",
            "entity": { "entityType": "unknown", "sourceId": "1" }
        });
        let (status, body) = send(&app.router, "POST", "/v1/events", Some(event)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "dead_lettered");
    }

    #[tokio::test]
    async fn reconciliation_reports_mismatches() {
        let app = app();
        for id in 1..=5 {
            mirror(&app, id, &format!("Person {id}"));
        }
        app.target.insert(&contact(), 103, json!({ "name": "Changed" }));

        let (status, body) = send(&app.router, "POST", "/v1/reconciliation/contact", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["itemsChecked"], 5);
        assert_eq!(body["summary"]["pagesChecked"], 3);
        assert_eq!(body["summary"]["mismatchCount"], 1);
        assert_eq!(body["report"]["mismatches"][0]["sourceId"], "3");
    }

    #[tokio::test]
    async fn reconciliation_of_unknown_type_is_404() {
        let app = app();
        let (status, _) = send(&app.router, "POST", "/v1/reconciliation/alert", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn single_check_returns_mismatch_or_no_content() {
        let app = app();
        mirror(&app, 1, "Ann");
        mirror(&app, 2, "Bob");
        app.target.insert(&contact(), 102, json!({ "name": "Rob" }));

        let (status, _) = send(&app.router, "GET", "/v1/reconciliation/contact/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app.router, "GET", "/v1/reconciliation/contact/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["differences"][0]["property"], "contact.name");
        assert_eq!(body["targetId"], "102");
    }

    #[tokio::test]
    async fn repair_creates_missing_target() {
        let app = app();
        app.source.insert(&contact(), 9, json!({ "name": "Lost" }));

        let (status, body) = send(&app.router, "POST", "/v1/repair/contact/9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targetId"], "7");
        assert_eq!(app.mappings.len(), 1);

        let (status, _) = send(&app.router, "POST", "/v1/repair/contact/10", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
