//! Key-value storage contract for smart links
//!
//! The resolver and creation flow only talk to [`LinkStore`]; the embedded
//! redb file ([`crate::database::RedbStore`]) and the in-memory map below are
//! interchangeable backings.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::model::{LinkPatch, SmartLinkRecord};

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<SmartLinkRecord>, StoreError>;

    /// Inserts a new record. Never overwrites: an existing key yields
    /// [`StoreError::Conflict`].
    async fn put(&self, code: &str, record: &SmartLinkRecord) -> Result<(), StoreError>;

    /// Applies `patch` atomically and returns the updated record, or `None`
    /// if there is no record under `code`.
    async fn update(&self, code: &str, patch: LinkPatch) -> Result<Option<SmartLinkRecord>, StoreError>;
}

/// Applies a patch in place and stamps `updated`.
pub fn apply_patch(record: &mut SmartLinkRecord, patch: LinkPatch) {
    if let Some(url) = patch.original_url {
        record.original_url = url;
    }
    record.clicks = record.clicks.saturating_add(patch.add_clicks);
    record.updated = Utc::now();
}

/// Process-local store, used by tests and throwaway instances
///
/// Each key is locked by its DashMap shard for the duration of a `put` or
/// `update`, so both are atomic per code.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, SmartLinkRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn get(&self, code: &str) -> Result<Option<SmartLinkRecord>, StoreError> {
        Ok(self.records.get(code).map(|record| record.clone()))
    }

    async fn put(&self, code: &str, record: &SmartLinkRecord) -> Result<(), StoreError> {
        match self.records.entry(code.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(code.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, code: &str, patch: LinkPatch) -> Result<Option<SmartLinkRecord>, StoreError> {
        Ok(self.records.get_mut(code).map(|mut record| {
            apply_patch(&mut record, patch);
            record.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(code: &str) -> SmartLinkRecord {
        let now = Utc::now();
        SmartLinkRecord {
            short_code: code.into(),
            original_url: "https://example.com".into(),
            tracking: true,
            expiry: None,
            password: None,
            clicks: 0,
            created: now,
            updated: now,
        }
    }

    #[tokio::test]
    async fn put_never_overwrites() {
        let store = MemoryStore::new();
        store.put("abc", &record("abc")).await.unwrap();

        let mut other = record("abc");
        other.original_url = "https://other.example".into();
        assert!(matches!(store.put("abc", &other).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.get("abc").await.unwrap().unwrap().original_url, "https://example.com");
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        store.put("hot", &record("hot")).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.update("hot", LinkPatch::click()).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get("hot").await.unwrap().unwrap().clicks, 50);
        assert!(store.update("cold", LinkPatch::click()).await.unwrap().is_none());
    }
}
