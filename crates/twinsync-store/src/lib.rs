//! Collaborator boundaries for twinsync.
//!
//! The coordinator and the reconciliation engine only ever talk to the two
//! systems-of-record and the mapping store through the traits defined here.
//! Concrete HTTP clients live outside this workspace.
//!
//! # Modules
//!
//! - [`error`] -- [`StoreError`], the shared failure taxonomy
//! - [`traits`] -- [`SourceClient`], [`TargetClient`], [`MappingStore`]
//! - [`page`] -- [`PageCursor`] / [`IdPage`] for paged id listings
//! - [`memory`] -- In-memory implementations with fault injection
//! - [`resilient`] -- Per-call timeout and bounded retry with backoff

pub mod error;
pub mod memory;
pub mod page;
pub mod resilient;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryMappingStore, InMemorySystem, Operation};
pub use page::{IdPage, PageCursor};
pub use resilient::{ResilientSource, ResilientTarget, TransportConfig};
pub use traits::{Entity, MappingStore, SourceClient, TargetClient};
