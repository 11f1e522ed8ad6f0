//! Per-entity serialization within one process.
//!
//! Two events for the same source id handled by this process run one after
//! the other. This only saves wasted target writes; duplicate creates across
//! processes are still caught by the mapping store's compare-and-set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use twinsync_types::{EntityType, SourceId};

type Key = (EntityType, SourceId);

#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one entity.
    pub async fn lock(&self, entity_type: &EntityType, source_id: &SourceId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Slots nobody holds or waits on can go.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots
                .entry((entity_type.clone(), source_id.clone()))
                .or_default()
                .clone()
        };
        slot.lock_owned().await
    }

    /// Entities currently locked or waited on.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.values().filter(|s| Arc::strong_count(s) > 1).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let contact = EntityType::from("contact");
        let id = SourceId::from(1);

        let guard = locks.lock(&contact, &id).await;
        let waiter = {
            let locks = locks.clone();
            let (contact, id) = (contact.clone(), id.clone());
            tokio::spawn(async move {
                let _g = locks.lock(&contact, &id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let contact = EntityType::from("contact");
        let _a = locks.lock(&contact, &SourceId::from(1)).await;
        let _b = locks.lock(&contact, &SourceId::from(2)).await;
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = KeyedLocks::new();
        let contact = EntityType::from("contact");
        drop(locks.lock(&contact, &SourceId::from(1)).await);
        let _b = locks.lock(&contact, &SourceId::from(2)).await;
        assert_eq!(locks.slots.lock().unwrap().len(), 1);
    }
}
