//! Structural differ for twinsync.
//!
//! Compares the source and target representations of one logical entity and
//! reports where they disagree. What to compare, how to normalize each
//! scalar, and how to pair up children of a collection is declared per
//! entity type in a [`DiffSchema`].
//!
//! The differ is reflexive (`diff(x, x)` is empty) and blind to the order in
//! which either system returns child collections.
//!
//! # Key Types
//!
//! - [`DiffSchema`] / [`FieldRule`] / [`FieldKind`] -- Per-entity comparison rules
//! - [`Normalizer`] -- Scalar normalization (flags, codes, dates, money, text)
//! - [`Differ`] -- Runs a schema over two JSON documents
//! - [`Difference`] -- One reported disagreement

pub mod difference;
pub mod differ;
pub mod error;
pub mod schema;

pub use difference::Difference;
pub use differ::{diff, Differ};
pub use error::{DiffError, DiffResult};
pub use schema::{CorrelationKey, DiffSchema, FieldKind, FieldRule, Normalizer};
