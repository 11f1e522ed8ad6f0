//! Reconciliation of one entity type through the real collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use twinsync_diff::{Difference, Differ};
use twinsync_store::{IdPage, MappingStore, PageCursor, SourceClient, TargetClient};
use twinsync_types::{EntityType, SourceId};

use crate::check::{ItemCheck, PageSource, Totals};
use crate::error::ReconcileResult;
use crate::report::MismatchRecord;

/// Pages through the source system's ids for one entity type.
pub struct SourcePages {
    entity_type: EntityType,
    source: Arc<dyn SourceClient>,
    target: Option<Arc<dyn TargetClient>>,
}

impl SourcePages {
    pub fn new(entity_type: EntityType, source: Arc<dyn SourceClient>) -> Self {
        Self {
            entity_type,
            source,
            target: None,
        }
    }

    /// Enable the totals pre-check against `target`.
    pub fn with_totals(mut self, target: Arc<dyn TargetClient>) -> Self {
        self.target = Some(target);
        self
    }
}

#[async_trait]
impl PageSource<SourceId> for SourcePages {
    async fn next_page(&self, cursor: PageCursor) -> ReconcileResult<IdPage<SourceId>> {
        Ok(self.source.fetch_id_page(&self.entity_type, cursor).await?)
    }

    async fn totals(&self) -> ReconcileResult<Option<Totals>> {
        let Some(target) = &self.target else {
            return Ok(None);
        };
        Ok(Some(Totals {
            source_count: self.source.count(&self.entity_type).await?,
            target_count: target.count(&self.entity_type).await?,
        }))
    }
}

/// Resolves the mapping, fetches both sides and diffs them.
///
/// A source id with no mapping, or a mapping whose target entity is gone,
/// is reported as a mismatch. A source entity deleted since it was listed
/// is not.
pub struct EntityCheck {
    entity_type: EntityType,
    source: Arc<dyn SourceClient>,
    target: Arc<dyn TargetClient>,
    mappings: Arc<dyn MappingStore>,
    differ: Differ,
}

impl EntityCheck {
    pub fn new(
        entity_type: EntityType,
        source: Arc<dyn SourceClient>,
        target: Arc<dyn TargetClient>,
        mappings: Arc<dyn MappingStore>,
        differ: Differ,
    ) -> Self {
        Self {
            entity_type,
            source,
            target,
            mappings,
            differ,
        }
    }

    fn root_path(&self) -> String {
        let root = &self.differ.schema().root;
        if root.is_empty() {
            self.entity_type.to_string()
        } else {
            root.clone()
        }
    }
}

#[async_trait]
impl ItemCheck<SourceId> for EntityCheck {
    async fn check(&self, id: &SourceId) -> ReconcileResult<Option<MismatchRecord>> {
        let Some(source_entity) = self.source.fetch(&self.entity_type, id).await? else {
            return Ok(None);
        };

        let Some(mapping) = self.mappings.get(&self.entity_type, id).await? else {
            return Ok(Some(MismatchRecord::entity(
                id,
                None,
                vec![Difference::new(
                    "mapping",
                    Value::String(id.to_string()),
                    Value::Null,
                )],
            )));
        };
        let target_id = mapping.target_id.to_string();

        let Some(target_entity) = self.target.fetch(&self.entity_type, &mapping.target_id).await?
        else {
            return Ok(Some(MismatchRecord::entity(
                id,
                Some(target_id.clone()),
                vec![Difference::new(
                    self.root_path(),
                    Value::String(target_id),
                    Value::Null,
                )],
            )));
        };

        let differences = self.differ.diff(&source_entity, &target_entity)?;
        if differences.is_empty() {
            Ok(None)
        } else {
            Ok(Some(MismatchRecord::entity(id, Some(target_id), differences)))
        }
    }
}
