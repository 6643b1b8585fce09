use sqlx::types::Json;
use sqlx::FromRow;

use crate::models::JsonMap;
use crate::services::memory::providers::VectorMatch;

/// One row of `memory_vectors` as read back by queries.
/// The embedding column is never selected.
#[derive(Debug, Clone, FromRow)]
pub struct VectorRow {
    pub id: String,
    pub document: String,
    pub metadata: Json<JsonMap>,
    pub distance: f32,
}

impl From<VectorRow> for VectorMatch {
    fn from(row: VectorRow) -> Self {
        Self {
            id: row.id,
            document: row.document,
            metadata: row.metadata.0,
            distance: row.distance,
        }
    }
}
