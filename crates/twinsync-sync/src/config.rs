use std::time::Duration;

use serde::{Deserialize, Serialize};
use twinsync_types::MappingType;

/// Coordinator settings, fixed at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mapping type recorded for entities created from source events.
    #[serde(default = "default_create_mapping_type")]
    pub create_mapping_type: MappingType,

    /// Whole-operation retries for update and delete events.
    #[serde(default = "default_operation_retries")]
    pub operation_retries: u32,

    #[serde(default = "default_operation_backoff_ms")]
    pub operation_backoff_ms: u64,

    /// Events processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Serialize work per source id within this process.
    #[serde(default)]
    pub keyed_locks: bool,
}

fn default_create_mapping_type() -> MappingType {
    MappingType::SourceCreated
}

fn default_operation_retries() -> u32 {
    3
}

fn default_operation_backoff_ms() -> u64 {
    250
}

fn default_workers() -> usize {
    8
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            create_mapping_type: default_create_mapping_type(),
            operation_retries: default_operation_retries(),
            operation_backoff_ms: default_operation_backoff_ms(),
            workers: default_workers(),
            keyed_locks: false,
        }
    }
}

impl SyncConfig {
    pub fn operation_backoff(&self) -> Duration {
        Duration::from_millis(self.operation_backoff_ms)
    }
}
