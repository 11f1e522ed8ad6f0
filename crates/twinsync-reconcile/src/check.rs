use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use twinsync_store::{IdPage, PageCursor};

use crate::error::ReconcileResult;
use crate::report::MismatchRecord;

/// Aggregate entity counts on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub source_count: u64,
    pub target_count: u64,
}

impl Totals {
    pub fn agree(&self) -> bool {
        self.source_count == self.target_count
    }
}

/// Lists the ids a sweep walks.
#[async_trait]
pub trait PageSource<K>: Send + Sync {
    async fn next_page(&self, cursor: PageCursor) -> ReconcileResult<IdPage<K>>;

    /// Aggregate counts for the pre-check, when available.
    async fn totals(&self) -> ReconcileResult<Option<Totals>> {
        Ok(None)
    }
}

/// Compares one item across the two systems.
#[async_trait]
pub trait ItemCheck<K>: Send + Sync {
    /// `Ok(None)` when the two sides agree.
    async fn check(&self, id: &K) -> ReconcileResult<Option<MismatchRecord>>;
}
