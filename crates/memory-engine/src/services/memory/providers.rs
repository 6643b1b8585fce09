//! Ports to the external collaborators: embedding provider, text
//! generation provider, vector database and key-value store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
use mockall::automock;

use crate::models::{ChatMessage, JsonMap};
use crate::utils::error::MemoryError;

/// Result of an operation that may fall back to a degraded value
/// instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Fresh(T),
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Fresh(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Fresh(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Fresh(_) => None,
            Outcome::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Health flag owned by a single adapter. Backend failures clear it,
/// successes set it; it never fails a call by itself.
#[derive(Debug)]
pub struct HealthFlag {
    healthy: AtomicBool,
}

impl HealthFlag {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    pub fn get(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Record the result of a backend call and pass it through.
    pub fn track<T>(&self, result: Result<T, MemoryError>) -> Result<T, MemoryError> {
        match &result {
            Ok(_) => self.set(true),
            Err(e) if e.is_backend() => self.set(false),
            Err(_) => {}
        }
        result
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedding generation. Failures degrade to zero vectors, never errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One text. A failed call yields a single all-zero vector.
    async fn embed(&self, text: &str) -> Outcome<Vec<f32>>;

    /// Many texts, output order matching input order. A failed provider
    /// batch yields all-zero vectors for every text of that batch.
    async fn embed_batch(&self, texts: &[String]) -> Outcome<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    async fn is_healthy(&self) -> bool;
}

/// Chat-style text generation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_with(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, MemoryError>;
}

/// One entry of a vector collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: JsonMap,
    pub document: String,
}

/// An entry returned by a query, with its cosine distance to the query
/// (0 for unranked reads).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub document: String,
    pub metadata: JsonMap,
    pub distance: f32,
}

/// Conjunction of metadata equality constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    equals: JsonMap,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, metadata: &JsonMap) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }

    /// JSON object usable with a JSONB containment (`@>`) check.
    pub fn as_json(&self) -> Value {
        Value::Object(self.equals.clone())
    }
}

/// Vector database with metadata filtering, one collection per instance.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Insert or replace by id (last write wins).
    async fn upsert(&self, record: VectorRecord) -> Result<(), MemoryError>;

    /// Nearest neighbours by cosine distance, best first.
    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<VectorMatch>, MemoryError>;

    /// Unranked read of every matching entry, optionally limited.
    async fn get(
        &self,
        filter: &MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<VectorMatch>, MemoryError>;

    /// Returns the number of removed entries.
    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, MemoryError>;

    /// Trivial listing probe.
    async fn ping(&self) -> Result<(), MemoryError>;
}

/// Key-value store with per-key TTL, hashes and sets.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically replace the field map at `key`, dropping any previous
    /// fields and expiry, set a new expiry when `ttl_seconds` is given, and
    /// record `key` as a member of the `index_key` set.
    async fn hset_indexed(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_seconds: Option<u64>,
        index_key: &str,
    ) -> Result<(), MemoryError>;

    /// Empty map when the key is missing or expired.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, MemoryError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MemoryError>;

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), MemoryError>;

    async fn srem(&self, key: &str, member: &str) -> Result<(), MemoryError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, MemoryError>;

    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError>;

    /// Plain string value, replacing any previous expiry.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>)
        -> Result<(), MemoryError>;

    async fn ping(&self) -> Result<(), MemoryError>;
}
