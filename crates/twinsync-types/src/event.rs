use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{EntityType, SourceId};
use crate::telemetry::TelemetryContext;

/// Unique identifier for an inbound event (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(uuid::Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Which system produced the change.
///
/// Both systems emit change notifications. Only source-originated events
/// drive writes; target-originated events are echoes of our own writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Source,
    Target,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("SOURCE"),
            Self::Target => f.write_str("TARGET"),
        }
    }
}

/// Pointer to the entity an event is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    pub entity_type: EntityType,
    pub source_id: SourceId,
}

impl EntityReference {
    pub fn new(entity_type: impl Into<EntityType>, source_id: impl Into<SourceId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            source_id: source_id.into(),
        }
    }
}

/// Inbound change notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub id: EventId,
    pub event_type: EventType,
    pub origin: Origin,
    pub entity: EntityReference,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, origin: Origin, entity: EntityReference) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            origin,
            entity,
            occurred_at: Utc::now(),
        }
    }

    /// Source-originated event, the only kind that drives writes.
    pub fn from_source(event_type: EventType, entity: EntityReference) -> Self {
        Self::new(event_type, Origin::Source, entity)
    }

    pub fn source_id(&self) -> &SourceId {
        &self.entity.source_id
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity.entity_type
    }

    pub fn drives_writes(&self) -> bool {
        self.origin == Origin::Source
    }

    /// Reject envelopes that can never be processed.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.entity.entity_type.as_str().trim().is_empty() {
            return Err(TypeError::InvalidEvent(format!(
                "event {} has a blank entity type",
                self.id
            )));
        }
        if self.entity.source_id.as_str().trim().is_empty() {
            return Err(TypeError::InvalidEvent(format!(
                "event {} has a blank source id",
                self.id
            )));
        }
        Ok(())
    }

    pub fn telemetry(&self) -> TelemetryContext {
        TelemetryContext::new()
            .with("eventId", self.id)
            .with("eventType", self.event_type)
            .with("entityType", &self.entity.entity_type)
            .with("sourceId", &self.entity.source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_source_origin_drives_writes() {
        let entity = EntityReference::new("contact", 12345);
        assert!(EventEnvelope::from_source(EventType::Created, entity.clone()).drives_writes());
        assert!(!EventEnvelope::new(EventType::Created, Origin::Target, entity).drives_writes());
    }

    #[test]
    fn validate_rejects_blank_ids() {
        let event = EventEnvelope::from_source(
            EventType::Updated,
            EntityReference::new("contact", SourceId::new_unchecked(" ")),
        );
        assert!(matches!(event.validate(), Err(TypeError::InvalidEvent(_))));
    }

    #[test]
    fn deserializes_minimal_envelope() {
        let json = r#"{
            "eventType": "DELETED",
            "origin": "SOURCE",
            "entity": { "entityType": "court-case", "sourceId": "991" }
        }"#;
        let event: EventEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::Deleted);
        assert_eq!(event.source_id(), &SourceId::from(991));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn telemetry_carries_identity() {
        let event = EventEnvelope::from_source(
            EventType::Created,
            EntityReference::new("contact", 12345),
        );
        let ctx = event.telemetry();
        assert_eq!(ctx.get("sourceId"), Some("12345"));
        assert_eq!(ctx.get("eventType"), Some("CREATED"));
    }
}
