use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::manager::MemoryManager;
use super::providers::{EmbeddingProvider, Outcome};
use super::ranker::{score_candidates, select_top, DEFAULT_MIN_SCORE, DEFAULT_TOP_K};
use super::session_context::SessionContextStore;
use crate::models::{JsonMap, OptimizeRequest, OptimizedContext, RelevantMemory};
use crate::utils::similarity::round2;

/// Histories longer than this are truncated.
pub const MAX_HISTORY_TURNS: usize = 10;
const HEAD_TURNS: usize = 2;
const TAIL_TURNS: usize = 8;

/// First `HEAD_TURNS` plus last `TAIL_TURNS` of a long history, in order.
/// Positional only: turns are neither ranked nor token counted.
pub fn truncate_history<T: Clone>(history: &[T]) -> Vec<T> {
    if history.len() <= MAX_HISTORY_TURNS {
        return history.to_vec();
    }
    let mut kept = Vec::with_capacity(HEAD_TURNS + TAIL_TURNS);
    kept.extend_from_slice(&history[..HEAD_TURNS]);
    kept.extend_from_slice(&history[history.len() - TAIL_TURNS..]);
    kept
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Assembles the bounded per-turn context: truncated history, the most
/// relevant long-term memories, and the session's context map.
pub struct ContextOptimizer {
    manager: Arc<MemoryManager>,
    sessions: Arc<SessionContextStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl ContextOptimizer {
    pub fn new(
        manager: Arc<MemoryManager>,
        sessions: Arc<SessionContextStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            manager,
            sessions,
            embeddings,
        }
    }

    /// Never fails: each source that cannot be read contributes an empty
    /// part and is listed in `degraded`.
    pub async fn optimize(&self, request: &OptimizeRequest) -> OptimizedContext {
        let (memories, session_context) = tokio::join!(
            self.relevant_memories(request.user_id.as_deref(), &request.user_query),
            self.session_context(request.session_id.as_deref()),
        );

        let mut degraded = Vec::new();
        if let Some(reason) = memories.reason() {
            degraded.push(reason.to_string());
        }
        if let Some(reason) = session_context.reason() {
            degraded.push(reason.to_string());
        }

        let conversation_history = truncate_history(&request.conversation_history);
        debug!(
            "Optimized context: {} of {} turns (max_tokens {} not enforced)",
            conversation_history.len(),
            request.conversation_history.len(),
            request.max_tokens
        );

        OptimizedContext {
            conversation_history,
            relevant_memories: memories.into_inner(),
            session_context: session_context.into_inner(),
            degraded,
        }
    }

    async fn relevant_memories(
        &self,
        user_id: Option<&str>,
        query: &str,
    ) -> Outcome<Vec<RelevantMemory>> {
        let Some(user_id) = user_id else {
            return Outcome::Fresh(Vec::new());
        };

        let items = match self.manager.long_term_items(user_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Skipping relevant memories for user {}: {}", user_id, e);
                return Outcome::degraded(Vec::new(), format!("relevant memories: {}", e));
            }
        };
        if items.is_empty() || query.trim().is_empty() {
            return Outcome::Fresh(Vec::new());
        }

        let query_embedding = self.embeddings.embed(query).await;
        if query_embedding.is_degraded() {
            // A zero query vector scores 0 against everything.
            warn!("Query embedding unavailable, no memories will rank");
            return Outcome::degraded(Vec::new(), "relevant memories: query embedding unavailable");
        }

        let texts: Vec<String> = items.iter().map(|item| value_text(&item.value)).collect();
        let item_embeddings = self.embeddings.embed_batch(&texts).await;
        if let Some(reason) = item_embeddings.reason() {
            warn!("Some memory embeddings unavailable: {}", reason);
        }

        let values: Vec<Value> = items.into_iter().map(|item| item.value).collect();
        let scored = score_candidates(
            query_embedding.value(),
            values,
            item_embeddings.value(),
        );

        let relevant = select_top(scored, DEFAULT_TOP_K, DEFAULT_MIN_SCORE)
            .into_iter()
            .map(|s| RelevantMemory {
                content: s.item,
                relevance: round2(s.score),
            })
            .collect();

        if item_embeddings.is_degraded() {
            Outcome::degraded(relevant, "relevant memories: partial embeddings")
        } else {
            Outcome::Fresh(relevant)
        }
    }

    async fn session_context(&self, session_id: Option<&str>) -> Outcome<JsonMap> {
        let Some(session_id) = session_id else {
            return Outcome::Fresh(JsonMap::new());
        };

        match self.sessions.get(session_id).await {
            Ok(Some(context)) => Outcome::Fresh(context),
            Ok(None) => Outcome::Fresh(JsonMap::new()),
            Err(e) => {
                warn!("Skipping session context for {}: {}", session_id, e);
                Outcome::degraded(JsonMap::new(), format!("session context: {}", e))
            }
        }
    }
}
