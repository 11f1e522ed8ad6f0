//! Background loop draining the retry queue.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::handler::MappingRetryHandler;
use crate::queue::RetryReceiver;
use crate::task::RetryTask;

/// Signals a [`RetryWorker`] to stop. Dropping the handle stops it too.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("retry worker shutdown requested");
        let _ = self.tx.send(true);
    }
}

enum Next {
    /// `false` once the shutdown handle is gone.
    Signal(bool),
    Task(Option<RetryTask>),
}

/// Drains a [`RetryReceiver`] one task at a time, waiting the policy's
/// backoff before each re-attempt.
pub struct RetryWorker {
    handler: Arc<MappingRetryHandler>,
    receiver: RetryReceiver,
    shutdown: watch::Receiver<bool>,
}

impl RetryWorker {
    pub fn new(handler: Arc<MappingRetryHandler>, receiver: RetryReceiver) -> (Self, ShutdownHandle) {
        let (tx, shutdown) = watch::channel(false);
        (
            Self {
                handler,
                receiver,
                shutdown,
            },
            ShutdownHandle { tx },
        )
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown or until the queue closes. Returns the number of
    /// tasks handled.
    pub async fn run(mut self) -> usize {
        info!("retry worker started");
        let mut handled = 0;
        loop {
            if self.stopping() {
                break;
            }
            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => Next::Signal(changed.is_ok()),
                task = self.receiver.recv() => Next::Task(task),
            };
            let task = match next {
                Next::Signal(true) => continue,
                Next::Signal(false) | Next::Task(None) => break,
                Next::Task(Some(task)) => task,
            };

            if task.attempt > 0 {
                let backoff = self.handler.policy().backoff_for(task.attempt - 1);
                // On shutdown the pending task still gets its attempt.
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = self.shutdown.changed() => {}
                }
            }

            if let Err(e) = self.handler.handle(task).await {
                error!(error = %e, "retry task could not be handled");
            }
            handled += 1;
        }
        info!(handled, "retry worker stopped");
        handled
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<usize> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::InMemoryDeadLetters;
    use crate::policy::RetryPolicy;
    use crate::queue::{retry_queue, RetryQueue};
    use std::time::Duration;
    use twinsync_store::{InMemoryMappingStore, Operation, StoreError};
    use twinsync_types::{EntityType, Mapping, MappingType, SourceId, TargetId, TelemetryContext};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            queue_capacity: 16,
        }
    }

    fn task(source: u64) -> RetryTask {
        RetryTask::mapping_create(
            Mapping::new(
                EntityType::from("contact"),
                SourceId::from(source),
                TargetId::from(source + 100),
                MappingType::SourceCreated,
            ),
            TelemetryContext::new(),
        )
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn worker_persists_after_transient_failures() {
        let store = Arc::new(InMemoryMappingStore::new());
        store.fail_next(Operation::MappingCreate, StoreError::Transient("blip".into()));
        store.fail_next(Operation::MappingCreate, StoreError::Transient("blip".into()));
        let dead = Arc::new(InMemoryDeadLetters::new());
        let (queue, rx) = retry_queue(16);
        let queue = Arc::new(queue);
        let handler = Arc::new(MappingRetryHandler::new(
            store.clone(),
            queue.clone(),
            dead.clone(),
            fast_policy(),
        ));
        let (worker, shutdown) = RetryWorker::new(handler, rx);
        let join = worker.spawn();

        queue.enqueue(task(1)).await.unwrap();
        wait_for(|| store.len() == 1).await;
        assert_eq!(store.calls(Operation::MappingCreate), 3);
        assert!(dead.is_empty());

        shutdown.shutdown();
        assert_eq!(join.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn worker_keeps_draining_a_full_queue() {
        let store = Arc::new(InMemoryMappingStore::new());
        for _ in 0..4 {
            store.fail_next(Operation::MappingCreate, StoreError::Transient("db down".into()));
        }
        let dead = Arc::new(InMemoryDeadLetters::new());
        let (queue, rx) = retry_queue(1);
        let queue = Arc::new(queue);
        let policy = RetryPolicy {
            initial_backoff_ms: 50,
            max_backoff_ms: 50,
            queue_capacity: 1,
            ..fast_policy()
        };
        let handler = Arc::new(MappingRetryHandler::new(
            store.clone(),
            queue.clone(),
            dead.clone(),
            policy,
        ));
        let (worker, shutdown) = RetryWorker::new(handler, rx);
        let join = worker.spawn();

        for source in 1..=3 {
            tokio::time::timeout(Duration::from_secs(2), queue.enqueue(task(source)))
                .await
                .unwrap()
                .unwrap();
        }
        // Each task ends up persisted or dead-lettered; none is stuck.
        wait_for(|| store.len() + dead.len() == 3).await;

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn worker_dead_letters_when_store_never_recovers() {
        let store = Arc::new(InMemoryMappingStore::new());
        for _ in 0..3 {
            store.fail_next(Operation::MappingCreate, StoreError::Unavailable("gone".into()));
        }
        let dead = Arc::new(InMemoryDeadLetters::new());
        let (queue, rx) = retry_queue(16);
        let queue = Arc::new(queue);
        let handler = Arc::new(MappingRetryHandler::new(
            store.clone(),
            queue.clone(),
            dead.clone(),
            fast_policy(),
        ));
        let (worker, shutdown) = RetryWorker::new(handler, rx);
        let join = worker.spawn();

        queue.enqueue(task(2)).await.unwrap();
        wait_for(|| dead.len() == 1).await;
        assert!(store.is_empty());

        drop(shutdown);
        join.await.unwrap();
    }
}
