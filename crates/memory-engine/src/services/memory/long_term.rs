use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::providers::{
    EmbeddingProvider, HealthFlag, MetadataFilter, VectorDatabase, VectorMatch, VectorRecord,
};
use crate::models::{
    JsonMap, MemoryDocument, MemoryItem, MemoryType, ScoredDocument, RESERVED_ITEM_METADATA,
};
use crate::utils::error::MemoryError;

pub const CONVERSATION_COLLECTION: &str = "conversation_memory";
pub const ITEM_COLLECTION: &str = "customer_memory";

/// Embedding-indexed documents in two collections: stored conversation
/// turns and keyed long-term items.
pub struct LongTermStore {
    conversations: Arc<dyn VectorDatabase>,
    items: Arc<dyn VectorDatabase>,
    embeddings: Arc<dyn EmbeddingProvider>,
    health: HealthFlag,
}

impl LongTermStore {
    pub fn new(
        conversations: Arc<dyn VectorDatabase>,
        items: Arc<dyn VectorDatabase>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            conversations,
            items,
            embeddings,
            health: HealthFlag::new(),
        }
    }

    fn user_filter(user_id: &str) -> MetadataFilter {
        MetadataFilter::new().eq("user_id", user_id)
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        let outcome = self.embeddings.embed(text).await;
        if let Some(reason) = outcome.reason() {
            warn!("Storing with a zero embedding: {}", reason);
        }
        outcome.into_inner()
    }

    /// Persist one conversation turn; returns the generated id.
    pub async fn store(
        &self,
        user_id: &str,
        document: &MemoryDocument,
    ) -> Result<String, MemoryError> {
        let id = Uuid::new_v4().to_string();
        let text = document.document_text();
        let embedding = self.embed(&text).await;

        let mut metadata = JsonMap::new();
        metadata.insert("user_id".to_string(), json!(user_id));
        metadata.insert("session_id".to_string(), json!(document.session_id));
        metadata.insert(
            "timestamp".to_string(),
            json!(document.turn.timestamp.to_rfc3339()),
        );
        metadata.insert("channel".to_string(), json!(document.turn.channel));
        metadata.insert(
            "full_data".to_string(),
            Value::String(serde_json::to_string(document)?),
        );

        self.health.track(
            self.conversations
                .upsert(VectorRecord {
                    id: id.clone(),
                    embedding,
                    metadata,
                    document: text,
                })
                .await,
        )?;

        info!("Stored long-term memory {} for user {}", id, user_id);
        Ok(id)
    }

    /// Nearest stored turns for `user_id`, best first. An empty query is a
    /// metadata-only read with distance 0.
    pub async fn query(
        &self,
        user_id: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, MemoryError> {
        let filter = Self::user_filter(user_id);
        let matches = if query_text.trim().is_empty() {
            self.health
                .track(self.conversations.get(&filter, Some(limit)).await)?
        } else {
            let embedding = self.embed(query_text).await;
            self.health
                .track(self.conversations.query(&embedding, &filter, limit).await)?
        };

        Ok(matches
            .into_iter()
            .filter_map(|m| {
                let distance = m.distance;
                decode_document(m).map(|document| ScoredDocument { document, distance })
            })
            .collect())
    }

    /// Every stored turn for `user_id`, unranked and unlimited.
    pub async fn get_all(&self, user_id: &str) -> Result<Vec<MemoryDocument>, MemoryError> {
        let matches = self
            .health
            .track(self.conversations.get(&Self::user_filter(user_id), None).await)?;
        Ok(matches.into_iter().filter_map(decode_document).collect())
    }

    /// Remove every entry for `user_id` from both collections.
    pub async fn delete(&self, user_id: &str) -> Result<u64, MemoryError> {
        let filter = Self::user_filter(user_id);
        let turns = self.health.track(self.conversations.delete(&filter).await)?;
        let items = self.health.track(self.items.delete(&filter).await)?;

        info!("Deleted {} long-term entries for user {}", turns + items, user_id);
        Ok(turns + items)
    }

    /// Upsert a keyed long-term item under its deterministic id.
    pub async fn put_item(&self, item: &MemoryItem) -> Result<String, MemoryError> {
        let id = item.id();
        let text = serde_json::to_string(&item.value)?;
        let embedding = self.embed(&text).await;

        let mut metadata = item.metadata.clone();
        metadata.insert("user_id".to_string(), json!(item.user_id));
        metadata.insert("key".to_string(), json!(item.key));
        metadata.insert("created_at".to_string(), json!(item.created_at.to_rfc3339()));

        self.health.track(
            self.items
                .upsert(VectorRecord {
                    id: id.clone(),
                    embedding,
                    metadata,
                    document: text,
                })
                .await,
        )?;

        debug!("Stored long-term item {}", id);
        Ok(id)
    }

    /// Keyed items for `user_id`. An empty query is a metadata-only read.
    pub async fn query_items(
        &self,
        user_id: &str,
        query_text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let filter = Self::user_filter(user_id);
        let matches = if query_text.trim().is_empty() {
            self.health.track(self.items.get(&filter, limit).await)?
        } else {
            let embedding = self.embed(query_text).await;
            let k = limit.unwrap_or(10);
            self.health
                .track(self.items.query(&embedding, &filter, k).await)?
        };

        Ok(matches
            .into_iter()
            .map(|m| rebuild_item(user_id, m))
            .collect())
    }

    pub async fn is_healthy(&self) -> bool {
        let healthy = self.conversations.ping().await.is_ok() && self.items.ping().await.is_ok();
        self.health.set(healthy);
        healthy
    }

    pub fn last_known_health(&self) -> bool {
        self.health.get()
    }
}

fn decode_document(m: VectorMatch) -> Option<MemoryDocument> {
    let raw = m.metadata.get("full_data").and_then(Value::as_str)?;
    match serde_json::from_str(raw) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!("Skipping undecodable long-term memory {}: {}", m.id, e);
            None
        }
    }
}

/// Rebuild a `MemoryItem` from its vector entry. The key comes from the
/// stored `key` metadata, else from the id after its `memory:{user}:long_term:`
/// prefix; a non-JSON document becomes `{"content": document}`.
fn rebuild_item(user_id: &str, m: VectorMatch) -> MemoryItem {
    let prefix = format!("memory:{}:{}:", user_id, MemoryType::LongTerm);
    let key = m
        .metadata
        .get("key")
        .and_then(Value::as_str)
        .or_else(|| m.id.strip_prefix(&prefix))
        .unwrap_or(&m.id)
        .to_string();
    let value = serde_json::from_str(&m.document).unwrap_or_else(|_| json!({ "content": m.document }));

    let created_at = m
        .metadata
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut metadata = m.metadata;
    for name in RESERVED_ITEM_METADATA {
        metadata.remove(name);
    }

    MemoryItem {
        user_id: user_id.to_string(),
        memory_type: MemoryType::LongTerm,
        key,
        value,
        metadata,
        created_at,
        last_accessed_at: Utc::now(),
        ttl: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryVectorDatabase;
    use crate::models::ConversationTurn;
    use crate::services::memory::providers::{MockEmbeddingProvider, MockVectorDatabase, Outcome};
    use chrono::TimeZone;

    fn embeddings() -> MockEmbeddingProvider {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|text| {
            // Refund talk points one way, everything else the other.
            if text.contains("refund") {
                Outcome::Fresh(vec![1.0, 0.0])
            } else {
                Outcome::Fresh(vec![0.0, 1.0])
            }
        });
        provider.expect_dimension().return_const(2usize);
        provider
    }

    fn store() -> LongTermStore {
        LongTermStore::new(
            Arc::new(InMemoryVectorDatabase::new()),
            Arc::new(InMemoryVectorDatabase::new()),
            Arc::new(embeddings()),
        )
    }

    fn document(user: &str, session: &str, message: &str, minute: u32) -> MemoryDocument {
        MemoryDocument {
            user_id: user.to_string(),
            session_id: session.to_string(),
            turn: ConversationTurn::new(
                format!("m{}", minute),
                message,
                "ok",
                Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            ),
            context: None,
            history: None,
        }
    }

    #[tokio::test]
    async fn test_store_then_query_ranks_by_distance() {
        let store = store();
        store.store("u1", &document("u1", "s1", "where is my parcel", 0)).await.unwrap();
        store.store("u1", &document("u1", "s1", "I want a refund", 1)).await.unwrap();
        store.store("u2", &document("u2", "s9", "refund please", 2)).await.unwrap();

        let hits = store.query("u1", "refund status", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.turn.message, "I want a refund");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_empty_query_is_metadata_only() {
        let store = store();
        for minute in 0..3 {
            store.store("u1", &document("u1", "s1", "hello", minute)).await.unwrap();
        }

        let hits = store.query("u1", "", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.distance == 0.0));
    }

    #[tokio::test]
    async fn test_get_all_and_delete_are_user_scoped() {
        let store = store();
        store.store("u1", &document("u1", "s1", "a", 0)).await.unwrap();
        store.store("u2", &document("u2", "s2", "b", 1)).await.unwrap();
        store
            .put_item(&MemoryItem::new("u1", MemoryType::LongTerm, "prefs", json!({"lang": "id"})))
            .await
            .unwrap();

        assert_eq!(store.get_all("u1").await.unwrap().len(), 1);
        assert_eq!(store.delete("u1").await.unwrap(), 2);
        assert!(store.get_all("u1").await.unwrap().is_empty());
        assert_eq!(store.get_all("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_items_round_trip_through_metadata_read() {
        let store = store();
        let mut metadata = JsonMap::new();
        metadata.insert("source".to_string(), json!("crm"));
        let item = MemoryItem::new("u1", MemoryType::LongTerm, "address", json!({"city": "Bandung"}))
            .with_metadata(metadata.clone());

        let id = store.put_item(&item).await.unwrap();
        assert_eq!(id, "memory:u1:long_term:address");

        let items = store.query_items("u1", "", None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "address");
        assert_eq!(items[0].value, json!({"city": "Bandung"}));
        assert_eq!(items[0].metadata, metadata);
        assert_eq!(items[0].memory_type, MemoryType::LongTerm);
    }

    #[tokio::test]
    async fn test_key_with_separator_survives_rebuild() {
        let store = store();
        let item = MemoryItem::new("u1", MemoryType::LongTerm, "order:42", json!({"status": "shipped"}));
        store.put_item(&item).await.unwrap();

        let items = store.query_items("u1", "", None).await.unwrap();
        assert_eq!(items[0].key, "order:42");
        assert!(items[0].metadata.is_empty());
    }

    #[test]
    fn test_key_falls_back_to_id_suffix() {
        let item = rebuild_item(
            "u1",
            VectorMatch {
                id: "memory:u1:long_term:order:7".to_string(),
                document: "{}".to_string(),
                metadata: JsonMap::new(),
                distance: 0.0,
            },
        );
        assert_eq!(item.key, "order:7");
    }

    #[test]
    fn test_non_json_document_becomes_content() {
        let item = rebuild_item(
            "u1",
            VectorMatch {
                id: "memory:u1:long_term:note".to_string(),
                document: "plain text".to_string(),
                metadata: JsonMap::new(),
                distance: 0.0,
            },
        );
        assert_eq!(item.key, "note");
        assert_eq!(item.value, json!({"content": "plain text"}));
    }

    #[tokio::test]
    async fn test_ping_failure_flips_health_without_failing_calls() {
        let mut db = MockVectorDatabase::new();
        db.expect_ping()
            .returning(|| Err(MemoryError::BackendUnavailable("down".into())));
        db.expect_get().returning(|_, _| Ok(Vec::new()));

        let store = LongTermStore::new(
            Arc::new(db),
            Arc::new(InMemoryVectorDatabase::new()),
            Arc::new(embeddings()),
        );

        assert!(!store.is_healthy().await);
        assert!(!store.last_known_health());
        assert!(store.get_all("u1").await.unwrap().is_empty());
        assert!(store.last_known_health());
    }
}
