use std::sync::Arc;

use tracing::{debug, error, info, warn};
use twinsync_store::{MappingStore, StoreError};

use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::error::RetryResult;
use crate::policy::RetryPolicy;
use crate::queue::RetryQueue;
use crate::task::RetryTask;

/// What happened to one retry task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDisposition {
    /// The mapping was written.
    Persisted,
    /// A mapping for the source id already existed; nothing to do.
    Discarded,
    /// Still failing; queued again with this attempt number.
    Requeued { attempt: u32 },
    /// Out of attempts, or failed in a way that will not heal.
    DeadLettered,
}

/// Re-attempts the mapping write of a [`RetryTask`], and only that.
pub struct MappingRetryHandler {
    mappings: Arc<dyn MappingStore>,
    queue: Arc<dyn RetryQueue>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
}

impl MappingRetryHandler {
    pub fn new(
        mappings: Arc<dyn MappingStore>,
        queue: Arc<dyn RetryQueue>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            mappings,
            queue,
            dead_letters,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn handle(&self, task: RetryTask) -> RetryResult<RetryDisposition> {
        let mapping = &task.mapping_payload;
        match self.mappings.create(mapping).await {
            Ok(()) => {
                info!(
                    entity_type = %mapping.entity_type,
                    source_id = %mapping.source_id,
                    target_id = %mapping.target_id,
                    attempt = task.attempt,
                    "mapping persisted on retry"
                );
                Ok(RetryDisposition::Persisted)
            }
            Err(StoreError::Conflict { existing }) => {
                if existing.same_pair(mapping) {
                    debug!(source_id = %mapping.source_id, "mapping already persisted");
                } else {
                    error!(
                        entity_type = %mapping.entity_type,
                        source_id = %mapping.source_id,
                        target_id = %mapping.target_id,
                        existing_target_id = %existing.target_id,
                        context = %task.telemetry_context,
                        "conflicting mapping on retry; target may hold a duplicate"
                    );
                }
                Ok(RetryDisposition::Discarded)
            }
            Err(e) if e.is_transient() => {
                let next = task.next_attempt();
                if self.policy.allows(next.attempt) {
                    warn!(
                        source_id = %mapping.source_id,
                        attempt = next.attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "mapping write failed again; requeueing"
                    );
                    let attempt = next.attempt;
                    match self.queue.try_enqueue(next.clone()) {
                        Ok(()) => Ok(RetryDisposition::Requeued { attempt }),
                        Err(queue_err) => {
                            error!(
                                source_id = %mapping.source_id,
                                target_id = %mapping.target_id,
                                attempt,
                                error = %queue_err,
                                "cannot requeue mapping write; dead-lettering"
                            );
                            self.dead_letters
                                .send(DeadLetter::mapping(next, format!("{queue_err}: {e}")))
                                .await?;
                            Ok(RetryDisposition::DeadLettered)
                        }
                    }
                } else {
                    self.dead_letters
                        .send(DeadLetter::mapping(next, format!("retries exhausted: {e}")))
                        .await?;
                    Ok(RetryDisposition::DeadLettered)
                }
            }
            Err(e) => {
                let next = task.next_attempt();
                self.dead_letters
                    .send(DeadLetter::mapping(next, e.to_string()))
                    .await?;
                Ok(RetryDisposition::DeadLettered)
            }
        }
    }
}
