//! Terminal failures that need an operator.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use twinsync_types::EventEnvelope;
use uuid::Uuid;

use crate::error::{RetryError, RetryResult};
use crate::task::RetryTask;

/// What was given up on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DeadLetterKind {
    /// A mapping write that exhausted its retries.
    Mapping(RetryTask),
    /// An inbound event that failed validation or exhausted its retries.
    Event(EventEnvelope),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: DeadLetterKind,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn mapping(task: RetryTask, reason: impl Into<String>) -> Self {
        let attempts = task.attempt;
        Self::new(DeadLetterKind::Mapping(task), reason, attempts)
    }

    pub fn event(event: EventEnvelope, reason: impl Into<String>, attempts: u32) -> Self {
        Self::new(DeadLetterKind::Event(event), reason, attempts)
    }

    fn new(kind: DeadLetterKind, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            reason: reason.into(),
            attempts,
            dead_lettered_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> RetryResult<()>;
}

/// Keeps dead letters in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetters {
    letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<DeadLetter> {
        self.letters
            .read()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.letters.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn send(&self, letter: DeadLetter) -> RetryResult<()> {
        error!(
            id = %letter.id,
            reason = %letter.reason,
            attempts = letter.attempts,
            "dead-lettered"
        );
        let mut letters = self
            .letters
            .write()
            .map_err(|e| RetryError::SinkUnavailable(format!("lock poisoned: {e}")))?;
        letters.push(letter);
        Ok(())
    }
}
