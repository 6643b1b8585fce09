use async_trait::async_trait;
use parking_lot::RwLock;

use crate::services::memory::providers::{MetadataFilter, VectorDatabase, VectorMatch, VectorRecord};
use crate::utils::error::MemoryError;
use crate::utils::similarity::cosine_distance;

/// In-process vector collection for local runs and tests.
/// Linear scan; records keep insertion order, an upsert replaces in place.
#[derive(Default)]
pub struct InMemoryVectorDatabase {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn to_match(record: &VectorRecord, distance: f32) -> VectorMatch {
    VectorMatch {
        id: record.id.clone(),
        document: record.document.clone(),
        metadata: record.metadata.clone(),
        distance,
    }
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn upsert(&self, record: VectorRecord) -> Result<(), MemoryError> {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        let records = self.records.read();
        let mut matches: Vec<VectorMatch> = records
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| to_match(r, cosine_distance(&r.embedding, embedding)))
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        Ok(matches)
    }

    async fn get(
        &self,
        filter: &MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<VectorMatch>, MemoryError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| to_match(r, 0.0))
            .collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<u64, MemoryError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| !filter.matches(&r.metadata));
        Ok((before - records.len()) as u64)
    }

    async fn ping(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
