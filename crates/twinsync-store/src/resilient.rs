//! Per-call timeout and bounded retry for the remote clients.
//!
//! This is the transport layer's own retry, nested inside the coordinator's
//! mapping retry. Only transient failures are retried, with exponential
//! backoff and jitter. `TargetClient::create` is never retried here: a
//! timed-out create may still have happened remotely.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use twinsync_types::{EntityType, SourceId, TargetId};

use crate::error::{StoreError, StoreResult};
use crate::page::{IdPage, PageCursor};
use crate::traits::{Entity, SourceClient, TargetClient};

/// Timeout and retry budget for a single outbound call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Run `call` once under the timeout.
    async fn once<T, Fut>(&self, call: Fut) -> StoreResult<T>
    where
        Fut: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout())),
        }
    }

    /// Run `call` under the timeout, retrying transient failures.
    async fn retrying<T, F, Fut>(&self, op: &'static str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff();
        loop {
            match self.once(call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(op, attempt, max_retries = self.max_retries, error = %e, ?backoff, "retrying call");
                    tokio::time::sleep(backoff).await;

                    let doubled = (backoff * 2).min(self.max_backoff());
                    let max_jitter = doubled.as_millis() as u64 / 4;
                    let jitter = rand::thread_rng().gen_range(0..=max_jitter);
                    backoff = doubled.saturating_add(Duration::from_millis(jitter));
                }
                Err(e) => {
                    debug!(op, attempt, error = %e, "call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// [`SourceClient`] wrapper applying a [`TransportConfig`] to every call.
pub struct ResilientSource<S> {
    inner: S,
    config: TransportConfig,
}

impl<S> ResilientSource<S> {
    pub fn new(inner: S, config: TransportConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SourceClient> SourceClient for ResilientSource<S> {
    async fn fetch(&self, entity_type: &EntityType, id: &SourceId) -> StoreResult<Option<Entity>> {
        self.config
            .retrying("source.fetch", || self.inner.fetch(entity_type, id))
            .await
    }

    async fn fetch_id_page(
        &self,
        entity_type: &EntityType,
        cursor: PageCursor,
    ) -> StoreResult<IdPage<SourceId>> {
        self.config
            .retrying("source.fetch_id_page", || {
                self.inner.fetch_id_page(entity_type, cursor)
            })
            .await
    }

    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64> {
        self.config
            .retrying("source.count", || self.inner.count(entity_type))
            .await
    }
}

/// [`TargetClient`] wrapper applying a [`TransportConfig`] to every call.
pub struct ResilientTarget<T> {
    inner: T,
    config: TransportConfig,
}

impl<T> ResilientTarget<T> {
    pub fn new(inner: T, config: TransportConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: TargetClient> TargetClient for ResilientTarget<T> {
    async fn create(&self, entity_type: &EntityType, entity: &Entity) -> StoreResult<TargetId> {
        self.config.once(self.inner.create(entity_type, entity)).await
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: &TargetId,
        entity: &Entity,
    ) -> StoreResult<()> {
        self.config
            .retrying("target.update", || self.inner.update(entity_type, id, entity))
            .await
    }

    async fn delete(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<()> {
        self.config
            .retrying("target.delete", || self.inner.delete(entity_type, id))
            .await
    }

    async fn fetch(&self, entity_type: &EntityType, id: &TargetId) -> StoreResult<Option<Entity>> {
        self.config
            .retrying("target.fetch", || self.inner.fetch(entity_type, id))
            .await
    }

    async fn count(&self, entity_type: &EntityType) -> StoreResult<u64> {
        self.config
            .retrying("target.count", || self.inner.count(entity_type))
            .await
    }
}
