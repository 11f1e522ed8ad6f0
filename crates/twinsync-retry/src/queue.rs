//! Hand-off channel between the coordinator and the retry worker.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{RetryError, RetryResult};
use crate::task::RetryTask;

/// Where failed mapping writes are parked for another attempt.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Enqueue, waiting for room.
    async fn enqueue(&self, task: RetryTask) -> RetryResult<()>;

    /// Enqueue only if there is room right now. The queue's own consumer
    /// must use this; waiting on its own channel would never end.
    fn try_enqueue(&self, task: RetryTask) -> RetryResult<()>;
}

/// Sending half of an in-process bounded queue.
#[derive(Clone, Debug)]
pub struct MpscRetryQueue {
    tx: mpsc::Sender<RetryTask>,
}

/// Receiving half of an in-process bounded queue.
#[derive(Debug)]
pub struct RetryReceiver {
    rx: mpsc::Receiver<RetryTask>,
}

/// Create a bounded in-process retry queue.
pub fn retry_queue(capacity: usize) -> (MpscRetryQueue, RetryReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MpscRetryQueue { tx }, RetryReceiver { rx })
}

#[async_trait]
impl RetryQueue for MpscRetryQueue {
    async fn enqueue(&self, task: RetryTask) -> RetryResult<()> {
        debug!(
            operation = %task.operation_name,
            attempt = task.attempt,
            source_id = %task.mapping_payload.source_id,
            "enqueueing retry task"
        );
        self.tx.send(task).await.map_err(|_| RetryError::QueueClosed)
    }

    fn try_enqueue(&self, task: RetryTask) -> RetryResult<()> {
        debug!(
            operation = %task.operation_name,
            attempt = task.attempt,
            source_id = %task.mapping_payload.source_id,
            "requeueing retry task"
        );
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RetryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RetryError::QueueClosed,
        })
    }
}

impl RetryReceiver {
    /// Next task, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RetryTask> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RetryTask> {
        self.rx.try_recv().ok()
    }
}
