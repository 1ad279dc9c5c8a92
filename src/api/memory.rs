//! Implements the `Store` trait using in-memory data.
//!
//! Note: this is compiled even in the "production" version so that the library can be embedded
//! without any backing storage, and so that sessions can be exercised without touching disk.

use crate::api::{check_revision, Store};
use crate::model::Record;
use crate::Result;
use anyhow::bail;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Holds records in a map keyed by username.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `username` with `record` as-is, bypassing the revision check.
    pub fn insert(&self, username: impl Into<String>, record: Record) {
        self.lock().insert(username.into(), record);
    }

    /// Returns a copy of what is stored for `username`.
    pub fn get(&self, username: &str) -> Option<Record> {
        self.lock().get(username).cloned()
    }

    /// While offline, every `fetch` and `save` fails as an unreachable remote would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("The memory store is offline");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Record>> {
        // A panic while holding the lock cannot leave a half-written record behind.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, username: &str) -> Result<Option<Record>> {
        self.check_online()?;
        Ok(self.get(username))
    }

    async fn save(&self, username: &str, record: &Record) -> Result<Record> {
        self.check_online()?;
        let mut records = self.lock();
        let revision = check_revision(username, records.get(username), record)?;
        let stored = record.with_revision(revision);
        records.insert(username.to_string(), stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        let mut record = Record::new();
        record.tasks.push(Task::new("buy milk", None));

        let saved = store.save("arun", &record).await.unwrap();
        assert_eq!(saved.revision(), 1);
        assert_eq!(store.load("arun").await, record.with_revision(1));
    }

    #[tokio::test]
    async fn test_offline_degrades_load_and_fails_save() {
        let store = MemoryStore::new();
        store.insert("arun", Record::new().with_revision(4));
        store.set_offline(true);
        assert!(store.fetch("arun").await.is_err());
        assert!(store.load("arun").await.is_empty());
        assert!(store.save("arun", &Record::new()).await.is_err());

        store.set_offline(false);
        assert_eq!(store.load("arun").await.revision(), 4);
    }
}
