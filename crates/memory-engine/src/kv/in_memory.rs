use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::services::memory::providers::KeyValueStore;
use crate::utils::error::MemoryError;

#[derive(Debug, Clone)]
enum KvValue {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: KvValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process key-value store for local runs and tests.
/// Uses DashMap with lazy expiry on access, mirroring Redis semantics
/// for the subset of commands the memory adapters need.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    storage: Arc<DashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        info!("Initializing in-memory key-value store");
        Self::default()
    }

    /// Live entry for `key`, dropping it first when expired.
    fn live(&self, key: &str) -> Option<Entry> {
        let entry = self.storage.get(key)?;
        if entry.is_expired() {
            drop(entry); // Release read lock
            self.storage.remove(key);
            debug!("Key {} expired, removed", key);
            return None;
        }
        Some(entry.value().clone())
    }

    fn wrong_type(key: &str) -> MemoryError {
        MemoryError::Validation(format!(
            "WRONGTYPE operation against key '{}' holding the wrong kind of value",
            key
        ))
    }

    fn write_hash(&self, key: &str, fields: &[(String, String)]) -> Result<(), MemoryError> {
        let existing = self.live(key);
        let mut entry = self.storage.entry(key.to_string()).or_insert(Entry {
            value: KvValue::Hash(HashMap::new()),
            expires_at: None,
        });
        if existing.is_none() {
            *entry = Entry {
                value: KvValue::Hash(HashMap::new()),
                expires_at: None,
            };
        }
        match &mut entry.value {
            KvValue::Hash(map) => {
                for (field, value) in fields {
                    map.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    fn replace_hash(&self, key: &str, fields: &[(String, String)], ttl_seconds: Option<u64>) {
        let map = fields.iter().cloned().collect();
        self.storage.insert(
            key.to_string(),
            Entry {
                value: KvValue::Hash(map),
                expires_at: ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
            },
        );
    }

    fn add_member(&self, key: &str, member: &str) -> Result<(), MemoryError> {
        let existing = self.live(key);
        let mut entry = self.storage.entry(key.to_string()).or_insert(Entry {
            value: KvValue::Set(HashSet::new()),
            expires_at: None,
        });
        if existing.is_none() {
            *entry = Entry {
                value: KvValue::Set(HashSet::new()),
                expires_at: None,
            };
        }
        match &mut entry.value {
            KvValue::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    fn set_expiry(&self, key: &str, ttl_seconds: u64) {
        if self.live(key).is_none() {
            return;
        }
        if let Some(mut entry) = self.storage.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn hset_indexed(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_seconds: Option<u64>,
        index_key: &str,
    ) -> Result<(), MemoryError> {
        self.replace_hash(key, fields, ttl_seconds);
        self.add_member(index_key, key)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, MemoryError> {
        match self.live(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: KvValue::Hash(map),
                ..
            }) => Ok(map),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MemoryError> {
        self.write_hash(key, &[(field.to_string(), value.to_string())])
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), MemoryError> {
        self.set_expiry(key, ttl_seconds);
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), MemoryError> {
        if self.live(key).is_none() {
            return Ok(());
        }
        if let Some(mut entry) = self.storage.get_mut(key) {
            match &mut entry.value {
                KvValue::Set(set) => {
                    set.remove(member);
                }
                _ => return Err(Self::wrong_type(key)),
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, MemoryError> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: KvValue::Set(set),
                ..
            }) => Ok(set.into_iter().collect()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: KvValue::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), MemoryError> {
        self.storage.insert(
            key.to_string(),
            Entry {
                value: KvValue::Str(value.to_string()),
                expires_at: ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
