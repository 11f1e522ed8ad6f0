//! Foundation types for twinsync.
//!
//! twinsync keeps a legacy system-of-record (the *target*) consistent with a
//! modern system-of-record (the *source*). This crate holds the vocabulary
//! every other twinsync crate shares.
//!
//! # Key Types
//!
//! - [`SourceId`] / [`TargetId`] -- Identifiers on either side of a mapping
//! - [`EntityType`] -- Tag naming an entity kind (e.g. `court-case`)
//! - [`Mapping`] / [`MappingType`] -- Durable source ↔ target id correspondence
//! - [`EventEnvelope`] -- Inbound change notification with its [`Origin`]
//! - [`TelemetryContext`] -- Structured fields carried through logs and retries

pub mod error;
pub mod event;
pub mod ids;
pub mod mapping;
pub mod telemetry;

pub use error::TypeError;
pub use event::{EntityReference, EventEnvelope, EventId, EventType, Origin};
pub use ids::{EntityType, SourceId, TargetId};
pub use mapping::{Mapping, MappingType};
pub use telemetry::TelemetryContext;
