//! The sweep loop.

use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use twinsync_store::PageCursor;

use crate::check::{ItemCheck, PageSource};
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::report::{MismatchRecord, ReconciliationReport};

/// Runs reconciliation sweeps under one [`ReconcileConfig`].
#[derive(Clone, Debug)]
pub struct ReconciliationEngine {
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconcileConfig) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Walk every page `pages` yields and check each id with `check`.
    ///
    /// A failed page fetch moves the cursor on by one page. The sweep fails
    /// only once more than `max_page_errors` pages have failed. Dropping the
    /// returned future aborts the checks in flight.
    pub async fn sweep<K>(
        &self,
        name: &str,
        pages: &dyn PageSource<K>,
        check: Arc<dyn ItemCheck<K>>,
    ) -> ReconcileResult<ReconciliationReport>
    where
        K: Clone + Display + Send + Sync + 'static,
    {
        let page_size = self.config.page_size;
        let mut report = ReconciliationReport::new(name);
        info!(name, page_size, workers = self.config.workers, "reconciliation sweep started");

        if self.config.totals_check {
            match pages.totals().await {
                Ok(Some(totals)) => {
                    if !totals.agree() {
                        warn!(
                            name,
                            source_count = totals.source_count,
                            target_count = totals.target_count,
                            "entity totals disagree"
                        );
                        report.mismatches.push(MismatchRecord::count(name, totals));
                    }
                    report.totals = Some(totals);
                }
                Ok(None) => {}
                Err(e) => warn!(name, error = %e, "totals pre-check failed; sweeping anyway"),
            }
        }

        let mut cursor = PageCursor::start(page_size);
        loop {
            let page = match pages.next_page(cursor).await {
                Ok(page) => page,
                Err(e) => {
                    report.page_errors += 1;
                    warn!(
                        name,
                        last_key = cursor.last_key,
                        page_errors = report.page_errors,
                        error = %e,
                        "page fetch failed; skipping page"
                    );
                    if report.page_errors > self.config.max_page_errors {
                        return Err(ReconcileError::TooManyPageErrors {
                            page_errors: report.page_errors,
                            ceiling: self.config.max_page_errors,
                            last_error: e.to_string(),
                        });
                    }
                    cursor = cursor.skip_page();
                    continue;
                }
            };

            let is_final = page.is_final(page_size);
            let next_key = page.next_key;
            if !page.ids.is_empty() {
                report.pages_checked += 1;
                debug!(name, last_key = cursor.last_key, ids = page.ids.len(), "checking page");
                self.check_page(page.ids, &check, &mut report).await;
            }
            if is_final {
                break;
            }
            cursor = cursor.advance_to(next_key);
        }

        report.finished_at = Some(Utc::now());
        info!(
            name,
            items_checked = report.items_checked,
            pages_checked = report.pages_checked,
            page_errors = report.page_errors,
            check_errors = report.check_errors,
            mismatches = report.mismatch_count(),
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Check a single id with the same check a sweep uses.
    pub async fn check_one<K>(
        &self,
        check: &dyn ItemCheck<K>,
        id: &K,
    ) -> ReconcileResult<Option<MismatchRecord>> {
        check.check(id).await
    }

    async fn check_page<K>(
        &self,
        ids: Vec<K>,
        check: &Arc<dyn ItemCheck<K>>,
        report: &mut ReconciliationReport,
    ) where
        K: Clone + Display + Send + Sync + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            let permits = permits.clone();
            let check = check.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = check.check(&id).await;
                (index, id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            report.items_checked += 1;
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    report.check_errors += 1;
                    warn!(error = %e, "check task failed");
                }
            }
        }

        // Report in listing order, not completion order.
        results.sort_by_key(|(index, _, _)| *index);
        for (_, id, result) in results {
            match result {
                Ok(Some(mismatch)) => {
                    debug!(id = %id, "mismatch found");
                    report.mismatches.push(mismatch);
                }
                Ok(None) => {}
                Err(e) => {
                    report.check_errors += 1;
                    warn!(id = %id, error = %e, "check failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Totals;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use twinsync_store::{IdPage, StoreError};

    /// Ids `1..=total`, listed by offset; selected page indices fail.
    struct NumberedPages {
        total: u64,
        failing_pages: BTreeSet<u64>,
        always_fail: bool,
        totals: Option<Totals>,
        calls: AtomicUsize,
    }

    impl NumberedPages {
        fn new(total: u64) -> Self {
            Self {
                total,
                failing_pages: BTreeSet::new(),
                always_fail: false,
                totals: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource<u64> for NumberedPages {
        async fn next_page(&self, cursor: PageCursor) -> ReconcileResult<IdPage<u64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page_index = cursor.last_key / cursor.page_size as u64;
            if self.always_fail || self.failing_pages.contains(&page_index) {
                return Err(StoreError::Transient(format!("page {page_index} unavailable")).into());
            }
            let start = cursor.last_key + 1;
            let end = (cursor.last_key + cursor.page_size as u64).min(self.total);
            let ids: Vec<u64> = (start..=end).collect();
            let next_key = cursor.last_key + ids.len() as u64;
            Ok(IdPage {
                ids,
                next_key,
                is_last: next_key >= self.total,
            })
        }

        async fn totals(&self) -> ReconcileResult<Option<Totals>> {
            Ok(self.totals)
        }
    }

    /// Flags configured ids as mismatches and fails on others.
    struct FlagIds {
        mismatching: BTreeSet<u64>,
        failing: BTreeSet<u64>,
        seen: Mutex<Vec<u64>>,
    }

    impl FlagIds {
        fn new(mismatching: impl IntoIterator<Item = u64>) -> Self {
            Self {
                mismatching: mismatching.into_iter().collect(),
                failing: BTreeSet::new(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ItemCheck<u64> for FlagIds {
        async fn check(&self, id: &u64) -> ReconcileResult<Option<MismatchRecord>> {
            self.seen.lock().unwrap().push(*id);
            if self.failing.contains(id) {
                return Err(StoreError::Timeout(std::time::Duration::from_secs(1)).into());
            }
            Ok(self
                .mismatching
                .contains(id)
                .then(|| MismatchRecord::entity(id, Some(format!("t{id}")), vec![])))
        }
    }

    fn engine(page_size: usize) -> ReconciliationEngine {
        ReconciliationEngine::new(ReconcileConfig {
            page_size,
            workers: 4,
            ..ReconcileConfig::default()
        })
        .unwrap()
    }

    fn mismatched_ids(report: &ReconciliationReport) -> Vec<String> {
        report
            .mismatches
            .iter()
            .filter_map(|m| m.source_id().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn full_sweep_over_four_pages() {
        let pages = NumberedPages::new(34);
        let check = Arc::new(FlagIds::new([1, 34]));
        let report = engine(10).sweep("contact", &pages, check.clone()).await.unwrap();

        assert_eq!(report.items_checked, 34);
        assert_eq!(report.pages_checked, 4);
        assert_eq!(report.mismatch_count(), 2);
        assert_eq!(mismatched_ids(&report), vec!["1", "34"]);
        assert!(report.summary().success);
        assert_eq!(check.seen.lock().unwrap().len(), 34);
    }

    #[tokio::test]
    async fn failed_page_is_skipped_and_counted() {
        let mut pages = NumberedPages::new(34);
        pages.failing_pages.insert(1);
        let check = Arc::new(FlagIds::new([1, 15, 25, 34]));
        let report = engine(10).sweep("contact", &pages, check).await.unwrap();

        assert_eq!(report.page_errors, 1);
        assert_eq!(report.pages_checked, 3);
        assert_eq!(report.items_checked, 24);
        assert_eq!(mismatched_ids(&report), vec!["1", "25", "34"]);
        assert!(report.summary().success);
    }

    #[tokio::test]
    async fn sweep_aborts_past_the_page_error_ceiling() {
        let mut pages = NumberedPages::new(1_000);
        pages.always_fail = true;
        let check = Arc::new(FlagIds::new([]));
        let err = engine(10).sweep("contact", &pages, check).await.unwrap_err();
        match err {
            ReconcileError::TooManyPageErrors {
                page_errors,
                ceiling,
                ..
            } => {
                assert_eq!(ceiling, 30);
                assert_eq!(page_errors, 31);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pages.calls.load(Ordering::SeqCst), 31);
    }

    #[tokio::test]
    async fn check_errors_are_tallied_separately() {
        let pages = NumberedPages::new(5);
        let mut flags = FlagIds::new([2]);
        flags.failing.insert(3);
        let report = engine(10).sweep("contact", &pages, Arc::new(flags)).await.unwrap();
        assert_eq!(report.items_checked, 5);
        assert_eq!(report.check_errors, 1);
        assert_eq!(mismatched_ids(&report), vec!["2"]);
    }

    #[tokio::test]
    async fn totals_disagreement_is_reported_and_sweep_still_runs() {
        let mut pages = NumberedPages::new(12);
        pages.totals = Some(Totals {
            source_count: 12,
            target_count: 11,
        });
        let report = engine(5)
            .sweep("contact", &pages, Arc::new(FlagIds::new([])))
            .await
            .unwrap();
        assert_eq!(report.items_checked, 12);
        assert_eq!(report.pages_checked, 3);
        assert!(matches!(
            report.mismatches[0],
            MismatchRecord::Count {
                source_count: 12,
                target_count: 11,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_source_finishes_immediately() {
        let pages = NumberedPages::new(0);
        let report = engine(10)
            .sweep("contact", &pages, Arc::new(FlagIds::new([])))
            .await
            .unwrap();
        assert_eq!(report.items_checked, 0);
        assert_eq!(report.pages_checked, 0);
        assert!(report.success());
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_stops_on_flagged_last_page() {
        let pages = NumberedPages::new(20);
        let report = engine(10)
            .sweep("contact", &pages, Arc::new(FlagIds::new([])))
            .await
            .unwrap();
        assert_eq!(report.pages_checked, 2);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn check_one_uses_the_sweep_check() {
        let check = FlagIds::new([9]);
        let e = engine(10);
        assert!(e.check_one(&check, &9u64).await.unwrap().is_some());
        assert!(e.check_one(&check, &8u64).await.unwrap().is_none());
    }
}
