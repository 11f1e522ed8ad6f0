//! Mapping-write retry and dead-lettering for twinsync.
//!
//! When a target write succeeds but persisting the id mapping fails, the
//! coordinator hands a [`RetryTask`] to a [`RetryQueue`]. A [`RetryWorker`]
//! drains the queue and re-attempts only the mapping write; the target
//! write is never repeated. Tasks that keep failing end up in a
//! [`DeadLetterSink`], which also receives events that failed for good.
//!
//! # Key Types
//!
//! - [`RetryTask`] -- One pending mapping write
//! - [`RetryPolicy`] -- Attempt bound and backoff
//! - [`RetryQueue`] / [`retry_queue`] -- Hand-off channel (tokio mpsc)
//! - [`MappingRetryHandler`] -- Decides persist, discard, requeue or dead-letter
//! - [`RetryWorker`] -- Background loop with graceful shutdown
//! - [`DeadLetter`] / [`DeadLetterSink`] -- Terminal failures

pub mod dead_letter;
pub mod error;
pub mod handler;
pub mod policy;
pub mod queue;
pub mod task;
pub mod worker;

pub use dead_letter::{DeadLetter, DeadLetterKind, DeadLetterSink, InMemoryDeadLetters};
pub use error::{RetryError, RetryResult};
pub use handler::{MappingRetryHandler, RetryDisposition};
pub use policy::RetryPolicy;
pub use queue::{retry_queue, MpscRetryQueue, RetryQueue, RetryReceiver};
pub use task::RetryTask;
pub use worker::{RetryWorker, ShutdownHandle};
