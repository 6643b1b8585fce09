use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::providers::{HealthFlag, KeyValueStore};
use crate::models::{memory_id, JsonMap, MemoryItem, MemoryType};
use crate::utils::error::MemoryError;

/// Optional type/key constraints for an item lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub memory_type: Option<MemoryType>,
    pub key: Option<String>,
}

impl ItemFilter {
    pub fn of_type(memory_type: MemoryType) -> Self {
        Self {
            memory_type: Some(memory_type),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Substring match on `:{type}:`, suffix match on `:{key}`.
    fn accepts(&self, id: &str) -> bool {
        let type_ok = self
            .memory_type
            .is_none_or(|t| id.contains(&format!(":{}:", t)));
        let key_ok = self
            .key
            .as_ref()
            .is_none_or(|k| id.ends_with(&format!(":{}", k)));
        type_ok && key_ok
    }
}

fn index_key(user_id: &str) -> String {
    format!("user:{}:memories", user_id)
}

/// TTL-bound, key-addressed facts kept as Redis-style field maps with a
/// per-user index set for enumeration.
pub struct ShortTermStore {
    kv: Arc<dyn KeyValueStore>,
    health: HealthFlag,
}

impl ShortTermStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            health: HealthFlag::new(),
        }
    }

    /// Write (or fully replace) an item. A `ttl` of 0 means no expiry.
    pub async fn put(
        &self,
        user_id: &str,
        key: &str,
        value: &Value,
        metadata: &JsonMap,
        ttl: Option<u64>,
    ) -> Result<String, MemoryError> {
        let id = memory_id(user_id, MemoryType::ShortTerm, key);
        let ttl = ttl.filter(|seconds| *seconds > 0);
        let now = Utc::now().to_rfc3339();

        let mut fields = vec![
            ("id".to_string(), id.clone()),
            ("userId".to_string(), user_id.to_string()),
            ("type".to_string(), MemoryType::ShortTerm.to_string()),
            ("key".to_string(), key.to_string()),
            ("value".to_string(), serde_json::to_string(value)?),
            ("metadata".to_string(), serde_json::to_string(metadata)?),
            ("created_at".to_string(), now.clone()),
            ("last_accessed".to_string(), now),
        ];
        if let Some(ttl) = ttl {
            fields.push(("ttl".to_string(), ttl.to_string()));
        }

        self.health.track(
            self.kv
                .hset_indexed(&id, &fields, ttl, &index_key(user_id))
                .await,
        )?;

        debug!("Stored short-term memory {}", id);
        Ok(id)
    }

    /// Items indexed for `user_id` that pass `filter`, in id order.
    /// Reading an item refreshes its `last_accessed` field.
    pub async fn get(
        &self,
        user_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let index = index_key(user_id);
        let mut ids = self.health.track(self.kv.smembers(&index).await)?;
        ids.sort();

        let mut items = Vec::new();
        for id in ids.into_iter().filter(|id| filter.accepts(id)) {
            let fields = self.health.track(self.kv.hgetall(&id).await)?;
            if fields.is_empty() {
                // Expired: drop the dangling index entry.
                self.health.track(self.kv.srem(&index, &id).await)?;
                debug!("Short-term memory {} expired", id);
                continue;
            }

            let now = Utc::now();
            self.health.track(
                self.kv
                    .hset(&id, "last_accessed", &now.to_rfc3339())
                    .await,
            )?;

            match decode_item(&fields, now) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping undecodable short-term memory {}: {}", id, e),
            }
        }

        Ok(items)
    }

    pub async fn is_healthy(&self) -> bool {
        let healthy = self.kv.ping().await.is_ok();
        self.health.set(healthy);
        healthy
    }

    pub fn last_known_health(&self) -> bool {
        self.health.get()
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, MemoryError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| MemoryError::Validation(format!("stored memory is missing '{}'", name)))
}

fn timestamp(raw: &str) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::Validation(format!("invalid timestamp '{}': {}", raw, e)))
}

fn decode_item(
    fields: &HashMap<String, String>,
    accessed_at: DateTime<Utc>,
) -> Result<MemoryItem, MemoryError> {
    let memory_type: MemoryType = field(fields, "type")?.parse()?;
    let value: Value = serde_json::from_str(field(fields, "value")?)?;
    let metadata: JsonMap = match fields.get("metadata") {
        Some(raw) => serde_json::from_str(raw)?,
        None => JsonMap::new(),
    };
    let ttl = fields.get("ttl").and_then(|raw| raw.parse().ok());

    Ok(MemoryItem {
        user_id: field(fields, "userId")?.to_string(),
        memory_type,
        key: field(fields, "key")?.to_string(),
        value,
        metadata,
        created_at: timestamp(field(fields, "created_at")?)?,
        last_accessed_at: accessed_at,
        ttl,
    })
}
