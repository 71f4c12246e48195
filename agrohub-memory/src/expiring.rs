use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agrohub::errors::StoreResult;
use agrohub::store::ExpiringStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory store for verification codes and sessions
///
/// Expiry follows the tokio clock, so tests running with paused time can
/// advance past a time to live without sleeping.
#[derive(Clone, Default)]
pub struct InMemoryExpiringStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryExpiringStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringStore for InMemoryExpiringStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: String, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entry = self.entries.lock().remove(key);
        Ok(entry
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
