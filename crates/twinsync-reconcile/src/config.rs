use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Ids requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Page failures tolerated before a sweep is abandoned.
    #[serde(default = "default_max_page_errors")]
    pub max_page_errors: u32,

    /// Concurrent checks within one page.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Compare aggregate counts before sweeping.
    #[serde(default = "default_totals_check")]
    pub totals_check: bool,
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_errors() -> u32 {
    30
}

fn default_workers() -> usize {
    10
}

fn default_totals_check() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_errors: default_max_page_errors(),
            workers: default_workers(),
            totals_check: default_totals_check(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.page_size == 0 {
            return Err(ReconcileError::InvalidConfig("page_size must be positive".into()));
        }
        if self.workers == 0 {
            return Err(ReconcileError::InvalidConfig("workers must be positive".into()));
        }
        Ok(())
    }
}
