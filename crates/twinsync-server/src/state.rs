use std::collections::HashMap;
use std::sync::Arc;

use twinsync_diff::Differ;
use twinsync_reconcile::{EntityCheck, ReconciliationEngine, SourcePages};
use twinsync_store::{MappingStore, SourceClient, TargetClient};
use twinsync_sync::{EventProcessor, SyncCoordinator};
use twinsync_types::EntityType;

use crate::error::{ServerError, ServerResult};

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    processor: EventProcessor,
    engine: ReconciliationEngine,
    source: Arc<dyn SourceClient>,
    target: Arc<dyn TargetClient>,
    mappings: Arc<dyn MappingStore>,
    differs: Arc<HashMap<EntityType, Differ>>,
}

impl AppState {
    pub fn new(
        processor: EventProcessor,
        engine: ReconciliationEngine,
        source: Arc<dyn SourceClient>,
        target: Arc<dyn TargetClient>,
        mappings: Arc<dyn MappingStore>,
        differs: HashMap<EntityType, Differ>,
    ) -> Self {
        Self {
            processor,
            engine,
            source,
            target,
            mappings,
            differs: Arc::new(differs),
        }
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        self.processor.coordinator()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// The check for an entity type with a configured diff schema.
    pub fn entity_check(&self, entity_type: &EntityType) -> ServerResult<EntityCheck> {
        let differ = self.differs.get(entity_type).ok_or_else(|| {
            ServerError::NotFound(format!("no reconciliation schema for {entity_type}"))
        })?;
        Ok(EntityCheck::new(
            entity_type.clone(),
            self.source.clone(),
            self.target.clone(),
            self.mappings.clone(),
            differ.clone(),
        ))
    }

    pub fn pages(&self, entity_type: &EntityType) -> SourcePages {
        let pages = SourcePages::new(entity_type.clone(), self.source.clone());
        if self.engine.config().totals_check {
            pages.with_totals(self.target.clone())
        } else {
            pages
        }
    }
}
