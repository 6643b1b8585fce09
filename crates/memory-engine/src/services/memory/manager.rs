use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embedding_queue::EmbeddingQueue;
use super::long_term::LongTermStore;
use super::short_term::{ItemFilter, ShortTermStore};
use super::summarizer::Summarizer;
use crate::models::{
    ConversationTurn, MemoryDocument, MemoryItem, MemoryType, ScoredDocument, SessionMemory,
};
use crate::utils::error::MemoryError;

/// Result of storing one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    pub memory_id: String,
    /// The caller's aggregate, compacted when it crossed the summarization threshold.
    pub aggregate: Option<SessionMemory>,
}

/// Last known reachability of each store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub short_term: bool,
    pub long_term: bool,
}

/// Orchestrates reads and writes across both memory tiers.
pub struct MemoryManager {
    short_term: Arc<ShortTermStore>,
    long_term: Arc<LongTermStore>,
    queue: EmbeddingQueue,
    summarizer: Summarizer,
    summarize_threshold: usize,
}

impl MemoryManager {
    pub fn new(
        short_term: Arc<ShortTermStore>,
        long_term: Arc<LongTermStore>,
        queue: EmbeddingQueue,
        summarizer: Summarizer,
        summarize_threshold: usize,
    ) -> Self {
        info!(
            "Initializing MemoryManager (summarize at {} turns)",
            summarize_threshold
        );
        Self {
            short_term,
            long_term,
            queue,
            summarizer,
            summarize_threshold,
        }
    }

    /// Persist one turn to the long-term tier, attaching the aggregate's
    /// context and history when given. An aggregate whose history reached
    /// the threshold is summarized; a failed summary keeps it unchanged.
    pub async fn store(
        &self,
        user_id: &str,
        session_id: &str,
        turn: ConversationTurn,
        aggregate: Option<SessionMemory>,
    ) -> Result<StoreOutcome, MemoryError> {
        let document = MemoryDocument {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            turn,
            context: aggregate.as_ref().map(|a| a.context.clone()),
            history: aggregate.as_ref().map(|a| a.history.clone()),
        };

        let memory_id = self.long_term.store(user_id, &document).await?;

        let aggregate = match aggregate {
            Some(aggregate) if aggregate.history.len() >= self.summarize_threshold => {
                let outcome = self.summarizer.summarize(aggregate).await;
                if let Some(reason) = outcome.reason() {
                    warn!("Keeping unsummarized history for {}: {}", session_id, reason);
                }
                Some(outcome.into_inner())
            }
            other => other,
        };

        Ok(StoreOutcome {
            memory_id,
            aggregate,
        })
    }

    /// Rebuild the session aggregate from stored turns: sorted ascending by
    /// timestamp, context maps folded in order, first/last interaction derived.
    pub async fn get(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<SessionMemory, MemoryError> {
        let mut documents = self.long_term.get_all(user_id).await?;
        if let Some(session_id) = session_id {
            documents.retain(|d| d.session_id == session_id);
        }
        // Stable: equal timestamps keep storage order.
        documents.sort_by_key(|d| d.turn.timestamp);

        let mut memory = SessionMemory::new(user_id, session_id.unwrap_or_default());
        for document in documents {
            if let Some(context) = document.context {
                memory.context.extend(context);
            }
            memory.history.push(document.turn);
        }
        memory.first_interaction = memory.history.first().map(|t| t.timestamp);
        memory.last_interaction = memory.history.last().map(|t| t.timestamp);

        debug!(
            "Loaded {} turns for user {}",
            memory.history.len(),
            user_id
        );
        Ok(memory)
    }

    /// Semantic search over stored turns, in the store's nearest-first order.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, MemoryError> {
        self.long_term.query(user_id, query, limit).await
    }

    /// Store a keyed item in its tier. Long-term items are embedded in the
    /// background: the id is returned before the item is searchable.
    pub async fn put_item(&self, item: MemoryItem) -> Result<String, MemoryError> {
        item.validate()?;

        match item.memory_type {
            MemoryType::ShortTerm => {
                self.short_term
                    .put(&item.user_id, &item.key, &item.value, &item.metadata, item.ttl)
                    .await
            }
            MemoryType::LongTerm => {
                let id = item.id();
                self.queue.enqueue(item)?;
                debug!("Queued long-term item {} for embedding", id);
                Ok(id)
            }
        }
    }

    /// Short-term lookup; a `LongTerm` request that finds nothing there
    /// falls back to a metadata-only read of the long-term tier.
    pub async fn get_items(
        &self,
        user_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let items = self.short_term.get(user_id, filter).await?;
        if !items.is_empty() {
            return Ok(items);
        }

        match filter.memory_type {
            Some(MemoryType::LongTerm) => {
                let mut items = self.long_term.query_items(user_id, "", None).await?;
                if let Some(key) = &filter.key {
                    items.retain(|item| &item.key == key);
                }
                debug!(
                    "Long-term fallback returned {} items for user {}",
                    items.len(),
                    user_id
                );
                Ok(items)
            }
            Some(MemoryType::ShortTerm) | None => Ok(items),
        }
    }

    pub async fn long_term_items(&self, user_id: &str) -> Result<Vec<MemoryItem>, MemoryError> {
        self.get_items(user_id, &ItemFilter::of_type(MemoryType::LongTerm))
            .await
    }

    /// Remove every long-term entry for the user; returns the count.
    pub async fn delete_user(&self, user_id: &str) -> Result<u64, MemoryError> {
        self.long_term.delete(user_id).await
    }

    /// Probe both stores.
    pub async fn health(&self) -> StoreHealth {
        let (short_term, long_term) =
            tokio::join!(self.short_term.is_healthy(), self.long_term.is_healthy());
        StoreHealth {
            short_term,
            long_term,
        }
    }

    pub fn embedding_queue(&self) -> &EmbeddingQueue {
        &self.queue
    }
}
