//! Entity-type dispatch.
//!
//! Every entity type the coordinator accepts has an [`EntityHandler`] in a
//! [`HandlerRegistry`] built once at startup. Events for unregistered types
//! are rejected as invalid.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use twinsync_store::Entity;
use twinsync_types::EntityType;

use crate::error::{SyncError, SyncResult};

/// Converts a source representation into the target's vocabulary.
pub trait Translator: Send + Sync {
    fn translate(&self, source: &Entity) -> SyncResult<Entity>;
}

/// Passes entities through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, source: &Entity) -> SyncResult<Entity> {
        Ok(source.clone())
    }
}

/// Renames top-level fields; fields without a rename are copied as they are.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRenameTranslator {
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Source fields dropped before the write.
    #[serde(default)]
    pub drop: Vec<String>,
}

impl FieldRenameTranslator {
    pub fn new<I, K, V>(renames: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            renames: renames
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            drop: Vec::new(),
        }
    }
}

impl Translator for FieldRenameTranslator {
    fn translate(&self, source: &Entity) -> SyncResult<Entity> {
        let fields = source.as_object().ok_or_else(|| {
            SyncError::Translation("source entity is not a JSON object".to_string())
        })?;
        let translated = fields
            .iter()
            .filter(|(name, _)| !self.drop.contains(name))
            .map(|(name, value)| {
                let name = self.renames.get(name).unwrap_or(name);
                (name.clone(), value.clone())
            })
            .collect();
        Ok(Value::Object(translated))
    }
}

/// Everything the coordinator needs to know about one entity type.
#[derive(Clone)]
pub struct EntityHandler {
    entity_type: EntityType,
    translator: Arc<dyn Translator>,
}

impl EntityHandler {
    pub fn new(entity_type: impl Into<EntityType>, translator: Arc<dyn Translator>) -> Self {
        Self {
            entity_type: entity_type.into(),
            translator,
        }
    }

    pub fn identity(entity_type: impl Into<EntityType>) -> Self {
        Self::new(entity_type, Arc::new(IdentityTranslator))
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn translate(&self, source: &Entity) -> SyncResult<Entity> {
        self.translator.translate(source)
    }
}

impl fmt::Debug for EntityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandler")
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}

/// Entity type → handler table.
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, EntityHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any earlier one for the same type.
    pub fn register(&mut self, handler: EntityHandler) -> &mut Self {
        self.handlers.insert(handler.entity_type.clone(), handler);
        self
    }

    pub fn with(mut self, handler: EntityHandler) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, entity_type: &EntityType) -> SyncResult<&EntityHandler> {
        self.handlers
            .get(entity_type)
            .ok_or_else(|| SyncError::UnknownEntityType(entity_type.clone()))
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.handlers.contains_key(entity_type)
    }

    /// Registered types, sorted.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rename_translator_renames_and_drops() {
        let mut t = FieldRenameTranslator::new([("firstName", "FIRST_NAME")]);
        t.drop.push("internalNotes".into());
        let out = t
            .translate(&json!({"firstName": "Ann", "age": 40, "internalNotes": "x"}))
            .unwrap();
        assert_eq!(out, json!({"FIRST_NAME": "Ann", "age": 40}));
    }

    #[test]
    fn rename_translator_rejects_non_objects() {
        let t = FieldRenameTranslator::default();
        assert!(matches!(t.translate(&json!([1])), Err(SyncError::Translation(_))));
    }

    #[test]
    fn registry_dispatches_by_type() {
        let registry = HandlerRegistry::new()
            .with(EntityHandler::identity("contact"))
            .with(EntityHandler::identity("court-case"));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.entity_types(),
            vec![EntityType::from("contact"), EntityType::from("court-case")]
        );
        let handler = registry.get(&EntityType::from("contact")).unwrap();
        assert_eq!(handler.translate(&json!({"a": 1})).unwrap(), json!({"a": 1}));
        assert!(matches!(
            registry.get(&EntityType::from("alert")),
            Err(SyncError::UnknownEntityType(_))
        ));
    }
}
