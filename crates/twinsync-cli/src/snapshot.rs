//! JSON snapshot files used to seed the in-memory systems.
//!
//! A system snapshot maps entity type to id to entity:
//!
//! ```json
//! { "contact": { "1": { "firstName": "Ann" }, "2": { "firstName": "Bo" } } }
//! ```
//!
//! A mapping file is a JSON array of mappings.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use twinsync_store::{InMemoryMappingStore, InMemorySystem};
use twinsync_types::{EntityType, Mapping};

type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

/// Load a system snapshot. Ids handed out by `create` continue after the
/// largest numeric id in the file.
pub fn load_system(path: &Path) -> anyhow::Result<InMemorySystem> {
    let snapshot: Snapshot = read_json(path)?;
    let next_id = snapshot
        .values()
        .flat_map(|entities| entities.keys())
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .map_or(1, |max| max.saturating_add(1));
    let system = InMemorySystem::starting_at(next_id);
    for (entity_type, entities) in snapshot {
        let entity_type = EntityType::parse(entity_type)?;
        for (id, entity) in entities {
            system.insert(&entity_type, id, entity);
        }
    }
    Ok(system)
}

/// Load a system snapshot if a path is given, otherwise an empty system.
pub fn load_system_or_empty(path: Option<&Path>) -> anyhow::Result<InMemorySystem> {
    match path {
        Some(path) => load_system(path),
        None => Ok(InMemorySystem::new()),
    }
}

pub fn load_mappings(path: &Path) -> anyhow::Result<InMemoryMappingStore> {
    let mappings: Vec<Mapping> = read_json(path)?;
    let store = InMemoryMappingStore::new();
    for mapping in mappings {
        store.seed(mapping);
    }
    Ok(store)
}

pub fn load_mappings_or_empty(path: Option<&Path>) -> anyhow::Result<InMemoryMappingStore> {
    match path {
        Some(path) => load_mappings(path),
        None => Ok(InMemoryMappingStore::new()),
    }
}
