//! Synchronization coordinator for twinsync.
//!
//! Turns source-side change events into writes against the target system
//! while keeping the source ↔ target id mapping consistent. Creates are
//! idempotent: a redelivered create event finds the mapping and does
//! nothing. Events that originate in the target are acknowledged and
//! dropped, which keeps the two systems from echoing changes back and forth.
//!
//! # Modules
//!
//! - [`config`] -- [`SyncConfig`], the coordinator's immutable settings
//! - [`handler`] -- [`Translator`], [`EntityHandler`], [`HandlerRegistry`]
//! - [`coordinator`] -- [`SyncCoordinator`] and [`SyncOutcome`]
//! - [`processor`] -- [`EventProcessor`], one bounded task per event
//! - [`locks`] -- [`KeyedLocks`], optional per-entity serialization

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod locks;
pub mod processor;

pub use config::SyncConfig;
pub use coordinator::{MappingWrite, SyncCoordinator, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use handler::{EntityHandler, FieldRenameTranslator, HandlerRegistry, IdentityTranslator, Translator};
pub use locks::KeyedLocks;
pub use processor::{EventProcessor, ProcessOutcome};
