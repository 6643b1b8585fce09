use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::memory::JsonMap;

pub const DEFAULT_MAX_TOKENS: usize = 4000;

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

/// Input of one context optimization.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub conversation_history: Vec<Value>,
    #[serde(default)]
    pub user_query: String,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    /// Accepted for compatibility; truncation is turn-count based, not token counted.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl OptimizeRequest {
    pub fn new(conversation_history: Vec<Value>, user_query: impl Into<String>) -> Self {
        Self {
            conversation_history,
            user_query: user_query.into(),
            user_id: None,
            session_id: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevantMemory {
    pub content: Value,
    pub relevance: f32,
}

/// The bounded context handed to the agent for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct OptimizedContext {
    pub conversation_history: Vec<Value>,
    pub relevant_memories: Vec<RelevantMemory>,
    pub session_context: JsonMap,
    /// Steps that fell back to an empty or partial result.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}
