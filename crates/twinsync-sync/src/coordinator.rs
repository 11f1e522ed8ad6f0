//! The synchronization coordinator.
//!
//! Only events whose origin is the source system cause writes. For a create
//! the order of steps matters: the mapping lookup comes before any side
//! effect, the target write happens at most once, and a failed mapping
//! write is handed to the retry queue instead of failing the operation.
//! Once the target create has returned, the create ends as `Created`
//! whatever happens to the mapping afterwards. The target entity and its
//! mapping are never rolled back together.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};
use twinsync_retry::{DeadLetter, DeadLetterSink, RetryQueue, RetryTask};
use twinsync_store::{MappingStore, SourceClient, StoreError, TargetClient};
use twinsync_types::{
    EntityType, EventEnvelope, EventType, Mapping, SourceId, TargetId, TelemetryContext,
};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::handler::HandlerRegistry;
use crate::locks::KeyedLocks;

/// What became of the mapping after a successful target create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingWrite {
    Persisted,
    /// Handed to the retry queue.
    Queued,
    /// Someone else mapped the source id first; the target may now hold a
    /// duplicate.
    Conflict,
    /// The retry queue refused the task, so it went to the dead-letter sink.
    DeadLettered,
    /// Neither the retry queue nor the dead-letter sink took the task. The
    /// mapping is only in the error log.
    Dropped,
}

/// Result of handling one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SyncOutcome {
    Created {
        target_id: TargetId,
        mapping: MappingWrite,
    },
    Updated {
        target_id: TargetId,
    },
    Deleted {
        target_id: TargetId,
    },
    /// Create for an already mapped entity.
    Duplicate {
        target_id: TargetId,
    },
    /// The entity is gone from the source by the time it was fetched.
    SourceMissing,
    /// Delete for an entity that has no mapping.
    AlreadyDeleted,
    /// The event came from the target system.
    Ignored,
}

pub struct SyncCoordinator {
    source: Arc<dyn SourceClient>,
    target: Arc<dyn TargetClient>,
    mappings: Arc<dyn MappingStore>,
    retry: Arc<dyn RetryQueue>,
    dead_letters: Arc<dyn DeadLetterSink>,
    handlers: HandlerRegistry,
    config: SyncConfig,
    locks: Option<KeyedLocks>,
}

impl SyncCoordinator {
    pub fn new(
        source: Arc<dyn SourceClient>,
        target: Arc<dyn TargetClient>,
        mappings: Arc<dyn MappingStore>,
        retry: Arc<dyn RetryQueue>,
        dead_letters: Arc<dyn DeadLetterSink>,
        handlers: HandlerRegistry,
        config: SyncConfig,
    ) -> Self {
        let locks = config.keyed_locks.then(KeyedLocks::new);
        Self {
            source,
            target,
            mappings,
            retry,
            dead_letters,
            handlers,
            config,
            locks,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Dispatch an event on its type.
    pub async fn synchronize(&self, event: &EventEnvelope) -> SyncResult<SyncOutcome> {
        event.validate()?;
        match event.event_type {
            EventType::Created => self.handle_create(event).await,
            EventType::Updated => self.handle_update(event).await,
            EventType::Deleted => self.handle_delete(event).await,
        }
    }

    pub async fn handle_create(&self, event: &EventEnvelope) -> SyncResult<SyncOutcome> {
        if !event.drives_writes() {
            return Ok(self.ignore(event));
        }
        self.create_from_source(event.entity_type(), event.source_id(), event.telemetry())
            .await
    }

    pub async fn handle_update(&self, event: &EventEnvelope) -> SyncResult<SyncOutcome> {
        if !event.drives_writes() {
            return Ok(self.ignore(event));
        }
        let (entity_type, source_id) = (event.entity_type(), event.source_id());
        let handler = self.handlers.get(entity_type)?;
        let _guard = self.lock(entity_type, source_id).await;

        let mapping = self
            .mappings
            .get(entity_type, source_id)
            .await?
            .ok_or_else(|| SyncError::MissingMapping {
                entity_type: entity_type.clone(),
                source_id: source_id.clone(),
            })?;

        let Some(entity) = self.source.fetch(entity_type, source_id).await? else {
            info!(%entity_type, %source_id, "source entity gone; skipping update");
            return Ok(SyncOutcome::SourceMissing);
        };
        let translated = handler.translate(&entity)?;
        self.target
            .update(entity_type, &mapping.target_id, &translated)
            .await?;

        info!(
            %entity_type,
            %source_id,
            target_id = %mapping.target_id,
            "target entity updated"
        );
        Ok(SyncOutcome::Updated {
            target_id: mapping.target_id,
        })
    }

    pub async fn handle_delete(&self, event: &EventEnvelope) -> SyncResult<SyncOutcome> {
        if !event.drives_writes() {
            return Ok(self.ignore(event));
        }
        let (entity_type, source_id) = (event.entity_type(), event.source_id());
        self.handlers.get(entity_type)?;
        let _guard = self.lock(entity_type, source_id).await;

        let Some(mapping) = self.mappings.get(entity_type, source_id).await? else {
            debug!(%entity_type, %source_id, "no mapping; already deleted");
            return Ok(SyncOutcome::AlreadyDeleted);
        };
        self.target.delete(entity_type, &mapping.target_id).await?;
        self.mappings.delete(entity_type, source_id).await?;

        info!(
            %entity_type,
            %source_id,
            target_id = %mapping.target_id,
            "target entity deleted"
        );
        Ok(SyncOutcome::Deleted {
            target_id: mapping.target_id,
        })
    }

    /// Force the create path for one source entity, whatever the last event
    /// said. Returns the target id the entity is mapped to.
    pub async fn repair(
        &self,
        entity_type: &EntityType,
        source_id: &SourceId,
    ) -> SyncResult<TargetId> {
        let telemetry = TelemetryContext::new()
            .with("operation", "repair")
            .with("entityType", entity_type)
            .with("sourceId", source_id);
        match self
            .create_from_source(entity_type, source_id, telemetry)
            .await?
        {
            SyncOutcome::Created { target_id, .. } | SyncOutcome::Duplicate { target_id } => {
                Ok(target_id)
            }
            _ => Err(SyncError::SourceNotFound {
                entity_type: entity_type.clone(),
                source_id: source_id.clone(),
            }),
        }
    }

    async fn create_from_source(
        &self,
        entity_type: &EntityType,
        source_id: &SourceId,
        mut telemetry: TelemetryContext,
    ) -> SyncResult<SyncOutcome> {
        let handler = self.handlers.get(entity_type)?;
        let _guard = self.lock(entity_type, source_id).await;

        if let Some(existing) = self.mappings.get(entity_type, source_id).await? {
            info!(
                %entity_type,
                %source_id,
                target_id = %existing.target_id,
                "duplicate create; already mapped"
            );
            return Ok(SyncOutcome::Duplicate {
                target_id: existing.target_id,
            });
        }

        let Some(entity) = self.source.fetch(entity_type, source_id).await? else {
            info!(%entity_type, %source_id, "source entity gone; skipping create");
            return Ok(SyncOutcome::SourceMissing);
        };
        let translated = handler.translate(&entity)?;

        let target_id = self.target.create(entity_type, &translated).await?;
        telemetry.insert("targetId", &target_id);
        info!(%entity_type, %source_id, %target_id, "target entity created");

        let mapping = Mapping::new(
            entity_type.clone(),
            source_id.clone(),
            target_id.clone(),
            self.config.create_mapping_type,
        );
        let write = self.persist_mapping(mapping, telemetry).await;
        Ok(SyncOutcome::Created {
            target_id,
            mapping: write,
        })
    }

    /// Infallible: by now the target entity exists and the create must not
    /// be reported as failed.
    async fn persist_mapping(&self, mapping: Mapping, telemetry: TelemetryContext) -> MappingWrite {
        match self.mappings.create(&mapping).await {
            Ok(()) => MappingWrite::Persisted,
            Err(StoreError::Conflict { existing }) => {
                error!(
                    entity_type = %mapping.entity_type,
                    source_id = %mapping.source_id,
                    target_id = %mapping.target_id,
                    existing_target_id = %existing.target_id,
                    context = %telemetry,
                    "mapping already exists for a freshly created target entity; possible duplicate in target"
                );
                MappingWrite::Conflict
            }
            Err(e) => {
                warn!(
                    source_id = %mapping.source_id,
                    target_id = %mapping.target_id,
                    error = %e,
                    "mapping write failed; queueing retry"
                );
                let task = RetryTask::mapping_create(mapping, telemetry);
                match self.retry.enqueue(task.clone()).await {
                    Ok(()) => MappingWrite::Queued,
                    Err(queue_err) => self.dead_letter_mapping(task, queue_err.to_string()).await,
                }
            }
        }
    }

    async fn dead_letter_mapping(&self, task: RetryTask, reason: String) -> MappingWrite {
        let mapping = task.mapping_payload.clone();
        warn!(
            source_id = %mapping.source_id,
            target_id = %mapping.target_id,
            %reason,
            "retry queue refused mapping write; dead-lettering"
        );
        match self.dead_letters.send(DeadLetter::mapping(task, reason)).await {
            Ok(()) => MappingWrite::DeadLettered,
            Err(e) => {
                error!(
                    entity_type = %mapping.entity_type,
                    source_id = %mapping.source_id,
                    target_id = %mapping.target_id,
                    mapping_type = ?mapping.mapping_type,
                    error = %e,
                    "mapping write lost; record it by hand"
                );
                MappingWrite::Dropped
            }
        }
    }

    fn ignore(&self, event: &EventEnvelope) -> SyncOutcome {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source_id = %event.source_id(),
            "event originated in target; ignoring"
        );
        SyncOutcome::Ignored
    }

    async fn lock(
        &self,
        entity_type: &EntityType,
        source_id: &SourceId,
    ) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.lock(entity_type, source_id).await),
            None => None,
        }
    }
}
