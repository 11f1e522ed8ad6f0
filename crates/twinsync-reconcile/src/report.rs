use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twinsync_diff::Difference;
use uuid::Uuid;

use crate::check::Totals;

/// One item, or one aggregate, that disagrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchRecord {
    #[serde(rename_all = "camelCase")]
    Entity {
        source_id: String,
        /// `None` when the entity has no mapping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
        differences: Vec<Difference>,
    },
    #[serde(rename_all = "camelCase")]
    Count {
        key: String,
        source_count: u64,
        target_count: u64,
    },
}

impl MismatchRecord {
    pub fn entity(
        source_id: impl ToString,
        target_id: Option<String>,
        differences: Vec<Difference>,
    ) -> Self {
        Self::Entity {
            source_id: source_id.to_string(),
            target_id,
            differences,
        }
    }

    pub fn count(key: impl Into<String>, totals: Totals) -> Self {
        Self::Count {
            key: key.into(),
            source_count: totals.source_count,
            target_count: totals.target_count,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::Entity { source_id, .. } => Some(source_id),
            Self::Count { .. } => None,
        }
    }
}

/// Outcome of one sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub id: Uuid,
    /// What was swept, usually an entity type.
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub items_checked: u64,
    /// Fetched pages that held at least one id.
    pub pages_checked: u64,
    pub page_errors: u32,
    pub check_errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    pub mismatches: Vec<MismatchRecord>,
}

impl ReconciliationReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            started_at: Utc::now(),
            finished_at: None,
            items_checked: 0,
            pages_checked: 0,
            page_errors: 0,
            check_errors: 0,
            totals: None,
            mismatches: Vec::new(),
        }
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }

    /// The sweep ran to the last page without hitting the page-error
    /// ceiling. Skipped pages and failed checks are counted in
    /// `page_errors` and `check_errors`, not here.
    pub fn success(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            items_checked: self.items_checked,
            pages_checked: self.pages_checked,
            mismatch_count: self.mismatch_count(),
            success: self.success(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub items_checked: u64,
    pub pages_checked: u64,
    pub mismatch_count: usize,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_reflects_counts() {
        let mut report = ReconciliationReport::new("contact");
        report.items_checked = 34;
        report.pages_checked = 4;
        report.mismatches.push(MismatchRecord::entity(1, Some("7".into()), vec![]));
        assert!(!report.success());
        report.finished_at = Some(Utc::now());
        assert_eq!(
            report.summary(),
            ReportSummary {
                items_checked: 34,
                pages_checked: 4,
                mismatch_count: 1,
                success: true
            }
        );
        report.page_errors = 1;
        report.check_errors = 2;
        assert!(report.summary().success);
    }

    #[test]
    fn records_serialize_with_kind() {
        let entity = MismatchRecord::entity(
            12345,
            None,
            vec![Difference::new("case.outcome", json!("A"), json!("B"))],
        );
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["kind"], "entity");
        assert_eq!(value["sourceId"], "12345");
        assert!(value.get("targetId").is_none());

        let count = MismatchRecord::count(
            "contact",
            Totals {
                source_count: 10,
                target_count: 9,
            },
        );
        let value = serde_json::to_value(&count).unwrap();
        assert_eq!(value["kind"], "count");
        assert_eq!(value["targetCount"], 9);
    }
}
