use serde::{Deserialize, Serialize};
use twinsync_types::{Mapping, TelemetryContext};

/// Operation name carried by tasks that re-attempt a mapping create.
pub const MAPPING_CREATE: &str = "mapping.create";

/// A mapping write that failed after its target write succeeded.
///
/// `attempt` counts re-attempts already made by the retry handler; the
/// coordinator's own failed write is not counted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryTask {
    pub operation_name: String,
    pub mapping_payload: Mapping,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub telemetry_context: TelemetryContext,
}

impl RetryTask {
    pub fn mapping_create(mapping: Mapping, telemetry: TelemetryContext) -> Self {
        Self {
            operation_name: MAPPING_CREATE.to_string(),
            mapping_payload: mapping,
            attempt: 0,
            telemetry_context: telemetry,
        }
    }

    /// The same task, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinsync_types::{EntityType, MappingType, SourceId, TargetId};

    fn task() -> RetryTask {
        let mapping = Mapping::new(
            EntityType::from("contact"),
            SourceId::from(12345),
            TargetId::from(7),
            MappingType::SourceCreated,
        );
        RetryTask::mapping_create(mapping, TelemetryContext::new().with("sourceId", 12345))
    }

    #[test]
    fn next_attempt_keeps_payload() {
        let t = task();
        let next = t.next_attempt().next_attempt();
        assert_eq!(next.attempt, 2);
        assert_eq!(next.mapping_payload, t.mapping_payload);
        assert_eq!(next.operation_name, MAPPING_CREATE);
    }

    #[test]
    fn serializes_with_channel_field_names() {
        let value = serde_json::to_value(task()).unwrap();
        assert_eq!(value["operationName"], "mapping.create");
        assert_eq!(value["telemetryContext"]["sourceId"], "12345");
        assert_eq!(value["mappingPayload"]["target_id"], "7");
    }
}
