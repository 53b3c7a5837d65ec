use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::CounterStore;
use crate::error::StoreError;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

/// Process-local store. Each operation holds the lock for its whole
/// read-modify-write, which makes `incr` atomic within the process.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        f(&mut entries, now)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: "0".into(),
                expires_at: None,
            });
            let current: i64 = entry.value.parse().map_err(|_| StoreError::Malformed {
                key: key.to_string(),
                reason: format!("'{}' is not an integer", entry.value),
            })?;
            let next = current + 1;
            entry.value = next.to_string();
            Ok(next)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(now + ttl);
            }
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.with_entries(|entries, _| entries.get(key).map(|e| e.value.clone())))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries, _| {
            entries.remove(key);
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
