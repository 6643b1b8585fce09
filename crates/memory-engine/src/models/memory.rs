use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::MemoryError;

/// Opaque JSON object used for metadata and context maps.
pub type JsonMap = Map<String, Value>;

/// The two memory tiers. Every call site matches both arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "short_term",
            MemoryType::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short_term" => Ok(MemoryType::ShortTerm),
            "long_term" => Ok(MemoryType::LongTerm),
            other => Err(MemoryError::Validation(format!(
                "Invalid memory type '{}'. Must be 'short_term' or 'long_term'",
                other
            ))),
        }
    }
}

/// Metadata names the long-term tier stores alongside an item's own
/// metadata; callers may not use them.
pub const RESERVED_ITEM_METADATA: [&str; 3] = ["user_id", "key", "created_at"];

/// Deterministic identity of a memory item: `memory:{user}:{type}:{key}`.
pub fn memory_id(user_id: &str, memory_type: MemoryType, key: &str) -> String {
    format!("memory:{}:{}:{}", user_id, memory_type, key)
}

/// A keyed fact in either tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub user_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub metadata: JsonMap,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Seconds until expiry; only meaningful for short-term items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl MemoryItem {
    pub fn new(
        user_id: impl Into<String>,
        memory_type: MemoryType,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            memory_type,
            key: key.into(),
            value,
            metadata: JsonMap::new(),
            created_at: now,
            last_accessed_at: now,
            ttl: None,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// A ttl of 0 means no expiry.
    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl.filter(|seconds| *seconds > 0);
        self
    }

    pub fn id(&self) -> String {
        memory_id(&self.user_id, self.memory_type, &self.key)
    }

    /// Text used when embedding or ranking this item's value.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.user_id.trim().is_empty() {
            return Err(MemoryError::Validation("userId must not be empty".to_string()));
        }
        if self.key.trim().is_empty() {
            return Err(MemoryError::Validation("key must not be empty".to_string()));
        }
        if self.user_id.contains(':') {
            return Err(MemoryError::Validation(
                "userId must not contain ':'".to_string(),
            ));
        }
        match self.memory_type {
            MemoryType::ShortTerm => {}
            MemoryType::LongTerm => {
                if let Some(name) = RESERVED_ITEM_METADATA
                    .iter()
                    .find(|name| self.metadata.contains_key(**name))
                {
                    return Err(MemoryError::Validation(format!(
                        "metadata key '{}' is reserved for long-term memories",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_channel() -> String {
    "unknown".to_string()
}

/// One message/response exchange. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

impl ConversationTurn {
    pub fn new(
        message_id: impl Into<String>,
        message: impl Into<String>,
        response: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            message: message.into(),
            response: response.into(),
            timestamp,
            channel: default_channel(),
            metadata: JsonMap::new(),
        }
    }
}

/// Per-session aggregate, recomputed from stored turns on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMemory {
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub first_interaction: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl SessionMemory {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            history: Vec::new(),
            context: JsonMap::new(),
            first_interaction: None,
            last_interaction: None,
        }
    }
}

/// Payload persisted in the long-term tier for one stored turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(flatten)]
    pub turn: ConversationTurn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ConversationTurn>>,
}

impl MemoryDocument {
    /// Text that gets embedded: user message, agent response, then each
    /// context entry as `key: value` in insertion order.
    pub fn document_text(&self) -> String {
        let mut lines = vec![
            format!("User: {}", self.turn.message),
            format!("Assistant: {}", self.turn.response),
        ];

        if let Some(context) = &self.context {
            for (key, value) in context {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("{}: {}", key, rendered));
            }
        }

        lines.join("\n")
    }
}

/// A long-term document with its backend distance (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub document: MemoryDocument,
    #[serde(rename = "similarityScore")]
    pub distance: f32,
}
