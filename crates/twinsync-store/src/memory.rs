//! In-memory collaborators for tests, local demos, and embedding.
//!
//! [`InMemorySystem`] plays either system-of-record; [`InMemoryMappingStore`]
//! is a compare-and-set mapping store. Both record how often each operation
//! was called and can be told to fail upcoming calls, which is how the
//! coordinator's partial-failure paths are exercised.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use twinsync_types::{EntityType, Mapping, SourceId, TargetId};

use crate::error::{StoreError, StoreResult};
use crate::page::{IdPage, PageCursor};
use crate::traits::{Entity, MappingStore, SourceClient, TargetClient};

/// Operations that can be counted and failed on the in-memory collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    FetchPage,
    Count,
    Create,
    Update,
    Delete,
    MappingGet,
    MappingCreate,
    MappingDelete,
}

/// Queued failures and call counters shared by the in-memory types.
#[derive(Debug, Default)]
struct Instrumentation {
    faults: Mutex<HashMap<Operation, VecDeque<StoreError>>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl Instrumentation {
    /// Count the call and pop a queued failure for it, if any.
    fn enter(&self, op: Operation) -> StoreResult<()> {
        {
            let mut calls = self.calls.lock().map_err(poisoned)?;
            *calls.entry(op).or_default() += 1;
        }
        let mut faults = self.faults.lock().map_err(poisoned)?;
        match faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail_next(&self, op: Operation, err: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.entry(op).or_default().push_back(err);
        }
    }

    fn calls(&self, op: Operation) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("lock poisoned: {e}"))
}

/// Numeric ids sort numerically, everything else lexicographically after them.
fn id_order(a: &str, b: &str) -> CmpOrdering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => CmpOrdering::Less,
        (Err(_), Ok(_)) => CmpOrdering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// InMemorySystem
// ---------------------------------------------------------------------------

/// An in-memory system-of-record holding JSON entities per entity type.
///
/// Paging treats the cursor key as an offset into the id-ordered population.
#[derive(Debug)]
pub struct InMemorySystem {
    entities: RwLock<HashMap<EntityType, BTreeMap<String, Entity>>>,
    next_id: AtomicU64,
    instrumentation: Instrumentation,
}

impl InMemorySystem {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Ids handed out by `create` start at `first_id`.
    pub fn starting_at(first_id: u64) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(first_id),
            instrumentation: Instrumentation::default(),
        }
    }

    pub fn insert(&self, entity_type: &EntityType, id: impl ToString, entity: Entity) {
        if let Ok(mut entities) = self.entities.write() {
            entities
                .entry(entity_type.clone())
                .or_default()
                .insert(id.to_string(), entity);
        }
    }

    pub fn remove(&self, entity_type: &EntityType, id: &str) -> Option<Entity> {
        self.entities
            .write()
            .ok()?
            .get_mut(entity_type)?
            .remove(id)
    }

    pub fn get(&self, entity_type: &EntityType, id: &str) -> Option<Entity> {
        self.entities.read().ok()?.get(entity_type)?.get(id).cloned()
    }

    pub fn len(&self, entity_type: &EntityType) -> usize {
        self.entities
            .read()
            .map(|e| e.get(entity_type).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, entity_type: &EntityType) -> bool {
        self.len(entity_type) == 0
    }

    /// Make the next call of `op` fail with `err`. Calls queue up.
    pub fn fail_next(&self, op: Operation, err: StoreError) {
        self.instrumentation.fail_next(op, err);
    }

    /// How many times `op` has been called, including failed calls.
    pub fn calls(&self, op: Operation) -> usize {
        self.instrumentation.calls(op)
    }

    fn read(&self, entity_type: &EntityType, id: &str) -> StoreResult<Option<Entity>> {
        let entities = self.entities.read().map_err(poisoned)?;
        Ok(entities.get(entity_type).and_then(|m| m.get(id)).cloned())
    }

    fn page(&self, entity_type: &EntityType, cursor: PageCursor) -> StoreResult<IdPage<SourceId>> {
        let entities = self.entities.read().map_err(poisoned)?;
        let mut keys: Vec<&String> = entities
            .get(entity_type)
            .map(|m| m.keys().collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| id_order(a, b));
        let total = keys.len() as u64;

        let offset = usize::try_from(cursor.last_key).unwrap_or(usize::MAX);
        let ids: Vec<SourceId> = keys
            .into_iter()
            .skip(offset)
            .take(cursor.page_size)
            .map(|k| SourceId::new_unchecked(k.as_str()))
            .collect();
        let next_key = cursor.last_key + ids.len() as u64;
        let is_last = next_key >= total;
        Ok(IdPage {
            ids,
            next_key,
            is_last,
        })
    }
}

impl Default for InMemorySystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceClient for InMemorySystem {
    async fn fetch(&self, entity_type: &EntityType, id: &SourceId) -> StoreResult<Option<Entity>> {
        self.instrumentation.enter(Operation::Fetch)?;
        self.read(entity_type, id.as_str())
    }

    async fn fetch_id_page(
        &self,
        entity_type: &EntityType,
        cursor: PageCursor,
    ) -> StoreResult<IdPage<SourceId>> {
        self.instrumentation.enter(Operation::FetchPage)?;
        self.page(entity_type, cursor)
    }

    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64> {
        self.instrumentation.enter(Operation::Count)?;
        Ok(self.len(entity_type) as u64)
    }
}

#[async_trait]
impl TargetClient for InMemorySystem {
    async fn create(&self, entity_type: &EntityType, entity: &Entity) -> StoreResult<TargetId> {
        self.instrumentation.enter(Operation::Create)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut entities = self.entities.write().map_err(poisoned)?;
        entities
            .entry(entity_type.clone())
            .or_default()
            .insert(id.to_string(), entity.clone());
        Ok(TargetId::from(id))
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: &TargetId,
        entity: &Entity,
    ) -> StoreResult<()> {
        self.instrumentation.enter(Operation::Update)?;
        let mut entities = self.entities.write().map_err(poisoned)?;
        let slot = entities
            .get_mut(entity_type)
            .and_then(|m| m.get_mut(id.as_str()))
            .ok_or_else(|| StoreError::Rejected(format!("{entity_type} {id} does not exist")))?;
        *slot = entity.clone();
        Ok(())
    }

    async fn delete(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<()> {
        self.instrumentation.enter(Operation::Delete)?;
        let mut entities = self.entities.write().map_err(poisoned)?;
        if let Some(m) = entities.get_mut(entity_type) {
            m.remove(id.as_str());
        }
        Ok(())
    }

    async fn fetch(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<Option<Entity>> {
        self.instrumentation.enter(Operation::Fetch)?;
        self.read(entity_type, id.as_str())
    }

    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64> {
        self.instrumentation.enter(Operation::Count)?;
        Ok(self.len(entity_type) as u64)
    }
}

// ---------------------------------------------------------------------------
// InMemoryMappingStore
// ---------------------------------------------------------------------------

/// An in-memory compare-and-set mapping store.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mappings: RwLock<HashMap<(EntityType, SourceId), Mapping>>,
    instrumentation: Instrumentation,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a mapping directly, bypassing the compare-and-set.
    pub fn seed(&self, mapping: Mapping) {
        if let Ok(mut mappings) = self.mappings.write() {
            mappings.insert(
                (mapping.entity_type.clone(), mapping.source_id.clone()),
                mapping,
            );
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Mapping> {
        let mut all: Vec<Mapping> = self
            .mappings
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| id_order(a.source_id.as_str(), b.source_id.as_str()));
        all
    }

    pub fn fail_next(&self, op: Operation, err: StoreError) {
        self.instrumentation.fail_next(op, err);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.instrumentation.calls(op)
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn get(
        &self,
        entity_type: &EntityType,
        source_id: &SourceId,
    ) -> StoreResult<Option<Mapping>> {
        self.instrumentation.enter(Operation::MappingGet)?;
        let mappings = self.mappings.read().map_err(poisoned)?;
        Ok(mappings
            .get(&(entity_type.clone(), source_id.clone()))
            .cloned())
    }

    async fn create(&self, mapping: &Mapping) -> StoreResult<()> {
        self.instrumentation.enter(Operation::MappingCreate)?;
        let mut mappings = self.mappings.write().map_err(poisoned)?;
        let key = (mapping.entity_type.clone(), mapping.source_id.clone());
        if let Some(existing) = mappings.get(&key) {
            return Err(StoreError::conflict(existing.clone()));
        }
        mappings.insert(key, mapping.clone());
        Ok(())
    }

    async fn delete(&self, entity_type: &EntityType, source_id: &SourceId) -> StoreResult<bool> {
        self.instrumentation.enter(Operation::MappingDelete)?;
        let mut mappings = self.mappings.write().map_err(poisoned)?;
        Ok(mappings
            .remove(&(entity_type.clone(), source_id.clone()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twinsync_types::MappingType;

    fn contact() -> EntityType {
        EntityType::from("contact")
    }

    fn mapping(source: u64, target: u64) -> Mapping {
        Mapping::new(
            contact(),
            SourceId::from(source),
            TargetId::from(target),
            MappingType::SourceCreated,
        )
    }

    #[tokio::test]
    async fn mapping_create_is_compare_and_set() {
        let store = InMemoryMappingStore::new();
        store.create(&mapping(1, 10)).await.unwrap();

        let err = store.create(&mapping(1, 11)).await.unwrap_err();
        match err {
            StoreError::Conflict { existing } => assert_eq!(existing.target_id, TargetId::from(10)),
            other => panic!("expected Conflict, got {other:?}"),
        }
        let kept = store.get(&contact(), &SourceId::from(1)).await.unwrap().unwrap();
        assert_eq!(kept.target_id, TargetId::from(10));
    }

    #[tokio::test]
    async fn mapping_delete_reports_existence() {
        let store = InMemoryMappingStore::new();
        store.seed(mapping(5, 50));
        assert!(store.delete(&contact(), &SourceId::from(5)).await.unwrap());
        assert!(!store.delete(&contact(), &SourceId::from(5)).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn queued_faults_fire_once_in_order() {
        let store = InMemoryMappingStore::new();
        store.fail_next(Operation::MappingCreate, StoreError::Transient("503".into()));

        assert!(store.create(&mapping(1, 10)).await.unwrap_err().is_transient());
        store.create(&mapping(1, 10)).await.unwrap();
        assert_eq!(store.calls(Operation::MappingCreate), 2);
    }

    #[tokio::test]
    async fn create_allocates_sequential_ids() {
        let system = InMemorySystem::starting_at(7);
        let a = system.create(&contact(), &json!({"n": 1})).await.unwrap();
        let b = system.create(&contact(), &json!({"n": 2})).await.unwrap();
        assert_eq!(a, TargetId::from(7));
        assert_eq!(b, TargetId::from(8));
        assert_eq!(system.calls(Operation::Create), 2);
    }

    #[tokio::test]
    async fn update_missing_entity_is_rejected() {
        let system = InMemorySystem::new();
        let err = system
            .update(&contact(), &TargetId::from(1), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn pages_walk_ids_in_numeric_order() {
        let system = InMemorySystem::new();
        for id in [10u64, 2, 33, 1, 4] {
            system.insert(&contact(), id, json!({ "id": id }));
        }

        let first = system
            .fetch_id_page(&contact(), PageCursor::start(2))
            .await
            .unwrap();
        assert_eq!(first.ids, vec![SourceId::from(1), SourceId::from(2)]);
        assert!(!first.is_final(2));

        let cursor = PageCursor::start(2).advance_to(first.next_key);
        let second = system.fetch_id_page(&contact(), cursor).await.unwrap();
        assert_eq!(second.ids, vec![SourceId::from(4), SourceId::from(10)]);

        let third = system
            .fetch_id_page(&contact(), cursor.advance_to(second.next_key))
            .await
            .unwrap();
        assert_eq!(third.ids, vec![SourceId::from(33)]);
        assert!(third.is_final(2));
    }

    #[tokio::test]
    async fn source_fetch_of_missing_entity_is_none() {
        let system = InMemorySystem::new();
        let found = SourceClient::fetch(&system, &contact(), &SourceId::from(9))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
