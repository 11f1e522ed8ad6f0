//! Trait boundaries for the two systems-of-record and the mapping store.
//!
//! Entities cross these boundaries as JSON documents. Field translation
//! between the source and target vocabularies happens in the entity
//! handlers, not here.

use async_trait::async_trait;
use twinsync_types::{EntityType, Mapping, SourceId, TargetId};

use crate::error::StoreResult;
use crate::page::{IdPage, PageCursor};

/// An entity representation as exchanged with either system.
pub type Entity = serde_json::Value;

/// Read access to the authoritative system.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one entity. Returns `Ok(None)` if it no longer exists.
    async fn fetch(&self, entity_type: &EntityType, id: &SourceId) -> StoreResult<Option<Entity>>;

    /// Fetch one page of ids, starting after `cursor.last_key`.
    async fn fetch_id_page(
        &self,
        entity_type: &EntityType,
        cursor: PageCursor,
    ) -> StoreResult<IdPage<SourceId>>;

    /// Total number of entities of this type.
    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64>;
}

/// Write access to the legacy system.
///
/// `create` is not idempotent: every call makes a new entity.
#[async_trait]
pub trait TargetClient: Send + Sync {
    async fn create(&self, entity_type: &EntityType, entity: &Entity) -> StoreResult<TargetId>;

    async fn update(
        &self,
        entity_type: &EntityType,
        id: &TargetId,
        entity: &Entity,
    ) -> StoreResult<()>;

    async fn delete(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<()>;

    /// Fetch one entity. Returns `Ok(None)` if it does not exist.
    async fn fetch(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<Option<Entity>>;

    /// Total number of entities of this type.
    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64>;
}

/// Durable source ↔ target id correspondence.
///
/// `create` must be a genuine compare-and-set: when a mapping for the same
/// `(entity_type, source_id)` already exists the call fails with
/// [`StoreError::Conflict`](crate::StoreError::Conflict) carrying the
/// existing mapping, and nothing is overwritten. Duplicate-create safety
/// across coordinator instances rests on this.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, entity_type: &EntityType, source_id: &SourceId)
        -> StoreResult<Option<Mapping>>;

    async fn create(&self, mapping: &Mapping) -> StoreResult<()>;

    /// Delete a mapping. Returns `Ok(true)` if it existed.
    async fn delete(&self, entity_type: &EntityType, source_id: &SourceId) -> StoreResult<bool>;
}
