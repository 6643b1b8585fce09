use serde::Serialize;

/// One knowledge base entry returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub id: String,
    pub title: String,
    pub content: String,
    /// `1 - cosine distance`, rounded to two decimals.
    pub relevance: f32,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Receipt for a text added to the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredVector {
    pub id: String,
    pub status: String,
    pub dimensions: usize,
}
