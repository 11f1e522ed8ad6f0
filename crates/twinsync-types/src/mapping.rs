use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{EntityType, SourceId, TargetId};

/// How a mapping came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    /// Produced by a bulk migration.
    Migrated,
    /// The entity was created in the source and replayed into the target.
    SourceCreated,
    /// The entity was created in the target and replayed into the source.
    TargetCreated,
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Migrated => "MIGRATED",
            Self::SourceCreated => "SOURCE_CREATED",
            Self::TargetCreated => "TARGET_CREATED",
        };
        f.write_str(s)
    }
}

impl FromStr for MappingType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MIGRATED" => Ok(Self::Migrated),
            "SOURCE_CREATED" => Ok(Self::SourceCreated),
            "TARGET_CREATED" => Ok(Self::TargetCreated),
            other => Err(TypeError::UnknownMappingType(other.to_string())),
        }
    }
}

/// Durable correspondence between a source entity and its target twin.
///
/// At most one mapping exists per `(entity_type, source_id)`. Mappings are
/// created once and deleted once; they are never updated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub entity_type: EntityType,
    pub source_id: SourceId,
    pub target_id: TargetId,
    pub mapping_type: MappingType,
    #[serde(default = "Utc::now")]
    pub when_created: DateTime<Utc>,
}

impl Mapping {
    pub fn new(
        entity_type: EntityType,
        source_id: SourceId,
        target_id: TargetId,
        mapping_type: MappingType,
    ) -> Self {
        Self {
            entity_type,
            source_id,
            target_id,
            mapping_type,
            when_created: Utc::now(),
        }
    }

    /// Two mappings describe the same correspondence, ignoring timestamps.
    pub fn same_pair(&self, other: &Mapping) -> bool {
        self.entity_type == other.entity_type
            && self.source_id == other.source_id
            && self.target_id == other.target_id
    }
}
