//! Bounded concurrent event processing.
//!
//! Each event runs as its own task; at most `SyncConfig::workers` run at
//! once. No ordering between events is assumed. Failures are classified:
//! invalid events are dead-lettered at once, transient update and delete
//! failures are retried as a whole a bounded number of times, everything
//! else is dead-lettered. Creates are never retried as a whole, so a target
//! create that may have gone through is not repeated.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use twinsync_retry::{DeadLetter, DeadLetterSink};
use twinsync_types::{EventEnvelope, EventType};

use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::error::{SyncError, SyncResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Synced(SyncOutcome),
    DeadLettered { reason: String },
}

#[derive(Clone)]
pub struct EventProcessor {
    coordinator: Arc<SyncCoordinator>,
    dead_letters: Arc<dyn DeadLetterSink>,
    permits: Arc<Semaphore>,
    /// Events accepted and not yet finished, queued ones included.
    in_flight: Arc<watch::Sender<usize>>,
}

/// Counts one event as in flight until dropped.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl EventProcessor {
    pub fn new(coordinator: Arc<SyncCoordinator>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        let workers = coordinator.config().workers.max(1);
        Self {
            coordinator,
            dead_letters,
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(watch::channel(0).0),
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Process one event, waiting for a free worker slot first.
    pub async fn process(&self, event: EventEnvelope) -> SyncResult<ProcessOutcome> {
        let _in_flight = InFlight::enter(&self.in_flight);
        self.acquire_and_run(event).await
    }

    /// Process one event on its own task. It counts as in flight from now,
    /// before it has a worker slot.
    pub fn submit(&self, event: EventEnvelope) -> JoinHandle<SyncResult<ProcessOutcome>> {
        let in_flight = InFlight::enter(&self.in_flight);
        let processor = self.clone();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            processor.acquire_and_run(event).await
        })
    }

    /// Wait until every accepted event has finished.
    pub async fn drain(&self) {
        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    /// Refuse further events, then wait for the ones in flight.
    pub async fn shutdown(&self) {
        info!("event processor shutting down");
        self.drain().await;
        self.permits.close();
    }

    async fn acquire_and_run(&self, event: EventEnvelope) -> SyncResult<ProcessOutcome> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::ShutDown)?;
        self.run(event).await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type, source_id = %event.source_id()))]
    async fn run(&self, event: EventEnvelope) -> SyncResult<ProcessOutcome> {
        let retries = match event.event_type {
            EventType::Updated | EventType::Deleted => self.coordinator.config().operation_retries,
            EventType::Created => 0,
        };
        let mut backoff = self.coordinator.config().operation_backoff();
        let mut attempt = 0;
        loop {
            let e = match self.coordinator.synchronize(&event).await {
                Ok(outcome) => return Ok(ProcessOutcome::Synced(outcome)),
                Err(e) => e,
            };
            if e.is_transient() && !e.is_validation() && attempt < retries {
                attempt += 1;
                warn!(attempt, retries, error = %e, ?backoff, "event failed; retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                continue;
            }
            let reason = e.to_string();
            self.dead_letters
                .send(DeadLetter::event(event, reason.clone(), attempt + 1))
                .await?;
            return Ok(ProcessOutcome::DeadLettered { reason });
        }
    }
}
