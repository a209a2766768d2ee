//! Expiring key-value store used by the blacklist and the rate limiter.
//!
//! The store is advisory: losing it degrades revocation immediacy and rate
//! limiting, never session state, which lives in the relational store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    #[error("value at {0} is not an integer")]
    NotAnInteger(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Delete a key. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, KvError>;

    /// Increment an integer counter, creating it at 1 without expiry.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Set the expiry of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Remaining lifetime. `None` if the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, KvError>;

    /// Increment a counter and, only when this increment created it, attach
    /// `ttl`. Must be atomic: the expiry is set exactly once per window.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, KvError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store. Suitable for a single instance only; multi-instance
/// deployments need a shared backend behind [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> Result<T, KvError>,
    ) -> Result<T, KvError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Unavailable("store lock poisoned".into()))?;
        let now = Instant::now();
        f(&mut entries, now)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.with_entries(|entries, now| {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            Ok(before - entries.len())
        })
        .unwrap_or(0)
    }
}

/// Look up a key, evicting it first if it has expired.
fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn increment(entry: &mut Entry, key: &str) -> Result<i64, KvError> {
    let current: i64 = entry
        .value
        .parse()
        .map_err(|_| KvError::NotAnInteger(key.to_string()))?;
    let next = current + 1;
    entry.value = next.to_string();
    Ok(next)
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_entries(|entries, now| Ok(live(entries, key, now).map(|e| e.value.clone())))
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.with_entries(|entries, now| Ok(live(entries, key, now).is_some()))
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        self.with_entries(|entries, now| {
            let existed = live(entries, key, now).is_some();
            entries.remove(key);
            Ok(existed)
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            Some(entry) => increment(entry, key),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".into(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, KvError> {
        self.with_entries(|entries, now| {
            Ok(live(entries, key, now)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now)))
        })
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        self.with_entries(|entries, now| match live(entries, key, now) {
            Some(entry) => increment(entry, key),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".into(),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
        })
    }
}
