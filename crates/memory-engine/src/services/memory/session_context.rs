use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::providers::{HealthFlag, KeyValueStore};
use crate::models::JsonMap;
use crate::utils::error::MemoryError;

fn context_key(session_id: &str) -> String {
    format!("session:{}:context", session_id)
}

fn metadata_key(session_id: &str) -> String {
    format!("session:{}:metadata", session_id)
}

/// Free-form per-session context, stored as JSON with a sliding expiry.
pub struct SessionContextStore {
    kv: Arc<dyn KeyValueStore>,
    ttl_seconds: u64,
    health: HealthFlag,
}

impl SessionContextStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl_seconds: u64) -> Self {
        Self {
            kv,
            ttl_seconds,
            health: HealthFlag::new(),
        }
    }

    /// `None` when the session has no (unexpired) context.
    pub async fn get(&self, session_id: &str) -> Result<Option<JsonMap>, MemoryError> {
        let raw = self
            .health
            .track(self.kv.get(&context_key(session_id)).await)?;
        let Some(raw) = raw else {
            debug!("No context for session {}", session_id);
            return Ok(None);
        };

        let context: JsonMap = serde_json::from_str(&raw)?;

        let meta = metadata_key(session_id);
        self.health.track(
            self.kv
                .hset(&meta, "last_accessed", &Utc::now().to_rfc3339())
                .await,
        )?;
        self.health
            .track(self.kv.expire(&meta, self.ttl_seconds).await)?;

        Ok(Some(context))
    }

    /// Replace the session's context and restart its expiry.
    pub async fn update(&self, session_id: &str, context: &JsonMap) -> Result<(), MemoryError> {
        let raw = serde_json::to_string(context)?;
        self.health.track(
            self.kv
                .set(&context_key(session_id), &raw, Some(self.ttl_seconds))
                .await,
        )?;

        let now = Utc::now().to_rfc3339();
        let meta = metadata_key(session_id);
        self.health
            .track(self.kv.hset(&meta, "last_updated", &now).await)?;
        self.health
            .track(self.kv.hset(&meta, "last_accessed", &now).await)?;
        self.health
            .track(self.kv.expire(&meta, self.ttl_seconds).await)?;

        debug!("Updated context for session {}", session_id);
        Ok(())
    }
}
