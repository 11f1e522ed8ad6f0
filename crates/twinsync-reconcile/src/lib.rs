//! Reconciliation sweeps for twinsync.
//!
//! A sweep walks every id the source system lists, one page at a time, and
//! checks each against the target. Pages are fetched in sequence; the ids
//! of one page are checked concurrently. A page that cannot be fetched is
//! skipped and counted, and the sweep only gives up once too many pages
//! have failed.
//!
//! # Key Types
//!
//! - [`ReconciliationEngine`] -- Runs sweeps and single checks
//! - [`PageSource`] / [`ItemCheck`] -- What to walk and how to check one item
//! - [`EntityCheck`] / [`SourcePages`] -- Ready-made pair backed by the clients and the differ
//! - [`ReconciliationReport`] / [`MismatchRecord`] -- Results

pub mod check;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod report;

pub use check::{ItemCheck, PageSource, Totals};
pub use config::ReconcileConfig;
pub use engine::ReconciliationEngine;
pub use entity::{EntityCheck, SourcePages};
pub use error::{ReconcileError, ReconcileResult};
pub use report::{MismatchRecord, ReconciliationReport, ReportSummary};
