use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;
use tracing::info;

use crate::config::{KvBackend, MemoryConfig, Settings, VectorBackend};
use crate::database::{DbPool, InMemoryVectorDatabase, PgVectorRepository};
use crate::kv::{InMemoryKvStore, RedisKvStore};
use crate::security::ApiKeyValidator;
use crate::services::memory::knowledge::KNOWLEDGE_COLLECTION;
use crate::services::memory::long_term::{CONVERSATION_COLLECTION, ITEM_COLLECTION};
use crate::services::memory::{
    ContextOptimizer, EmbeddingProvider, EmbeddingQueue, KeyValueStore, KnowledgeBase, LongTermStore,
    MemoryManager, QueueConfig, SessionContextStore, ShortTermStore, Summarizer, TextGenerator,
    VectorDatabase,
};
use crate::services::{EmbeddingService, LlmService};

/// External collaborators, built once at startup (or by tests).
pub struct Backends {
    pub kv: Arc<dyn KeyValueStore>,
    pub conversations: Arc<dyn VectorDatabase>,
    pub items: Arc<dyn VectorDatabase>,
    pub knowledge: Arc<dyn VectorDatabase>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn TextGenerator>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub memory_manager: Arc<MemoryManager>,
    pub context_optimizer: Arc<ContextOptimizer>,
    pub session_context: Arc<SessionContextStore>,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub api_key_validator: Arc<ApiKeyValidator>,
}

impl AppState {
    /// Wire the memory core on top of the given backends.
    pub fn new(backends: Backends, memory: &MemoryConfig, api_key: Option<String>) -> Self {
        let short_term = Arc::new(ShortTermStore::new(backends.kv.clone()));
        let long_term = Arc::new(LongTermStore::new(
            backends.conversations,
            backends.items,
            backends.embeddings.clone(),
        ));
        let queue = EmbeddingQueue::new(
            long_term.clone(),
            QueueConfig {
                capacity: memory.queue_capacity,
                worker_count: memory.queue_workers,
            },
        );

        let memory_manager = Arc::new(MemoryManager::new(
            short_term,
            long_term,
            queue,
            Summarizer::new(backends.generator),
            memory.summarize_threshold,
        ));
        let session_context = Arc::new(SessionContextStore::new(
            backends.kv,
            memory.session_ttl_seconds,
        ));
        let context_optimizer = Arc::new(ContextOptimizer::new(
            memory_manager.clone(),
            session_context.clone(),
            backends.embeddings.clone(),
        ));

        let knowledge_base = Arc::new(KnowledgeBase::new(
            backends.knowledge,
            backends.embeddings.clone(),
        ));

        Self {
            memory_manager,
            context_optimizer,
            session_context,
            knowledge_base,
            embeddings: backends.embeddings,
            api_key_validator: Arc::new(ApiKeyValidator::new(api_key)),
        }
    }

    /// Connect the configured backends and wire the state.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match settings.redis.backend {
            KvBackend::Redis => Arc::new(RedisKvStore::connect(&settings.redis.url).await?),
            KvBackend::Memory => {
                info!("Using in-memory key-value store");
                Arc::new(InMemoryKvStore::new())
            }
        };

        let (conversations, items, knowledge): (
            Arc<dyn VectorDatabase>,
            Arc<dyn VectorDatabase>,
            Arc<dyn VectorDatabase>,
        ) = match settings.database.backend {
            VectorBackend::Postgres => {
                let pool = DbPool::new(&settings.database).await?;
                pool.ensure_schema(settings.embedding.dimension).await?;
                (
                    Arc::new(PgVectorRepository::new(pool.clone(), CONVERSATION_COLLECTION)),
                    Arc::new(PgVectorRepository::new(pool.clone(), ITEM_COLLECTION)),
                    Arc::new(PgVectorRepository::new(pool, KNOWLEDGE_COLLECTION)),
                )
            }
            VectorBackend::Memory => {
                info!("Using in-memory vector database");
                (
                    Arc::new(InMemoryVectorDatabase::new()),
                    Arc::new(InMemoryVectorDatabase::new()),
                    Arc::new(InMemoryVectorDatabase::new()),
                )
            }
        };

        let backends = Backends {
            kv,
            conversations,
            items,
            knowledge,
            embeddings: Arc::new(EmbeddingService::new(&settings.embedding)?),
            generator: Arc::new(LlmService::new(&settings.llm)?),
        };

        Ok(Self::new(
            backends,
            &settings.memory,
            settings.security.api_key.clone(),
        ))
    }
}

impl FromRef<AppState> for Arc<MemoryManager> {
    fn from_ref(state: &AppState) -> Self {
        state.memory_manager.clone()
    }
}

impl FromRef<AppState> for Arc<ContextOptimizer> {
    fn from_ref(state: &AppState) -> Self {
        state.context_optimizer.clone()
    }
}

impl FromRef<AppState> for Arc<KnowledgeBase> {
    fn from_ref(state: &AppState) -> Self {
        state.knowledge_base.clone()
    }
}

impl FromRef<AppState> for Arc<SessionContextStore> {
    fn from_ref(state: &AppState) -> Self {
        state.session_context.clone()
    }
}
