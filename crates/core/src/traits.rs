use crate::error::StoreError;
use crate::models::{IndexStats, ManualChunk, QueryFilter};
use async_trait::async_trait;

/// The persisted form of a chunk inside the vector database. Records
/// are never mutated in place: an update is a delete plus reinsert,
/// which deterministic ids turn into a plain upsert.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: ManualChunk,
}

/// A ranked hit from a similarity query, best first.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ManualChunk,
    pub score: f32,
}

/// Black-box contract of the vector database. The application only
/// ever talks to the index through this seam, which is also where the
/// tests plug in fakes.
#[async_trait]
pub trait VectorIndex {
    /// Idempotent create-if-absent. Must not recreate or fail when the
    /// index already exists with the same dimension.
    async fn ensure_index(&self, dimension: usize) -> Result<(), StoreError>;

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), StoreError>;

    /// Ranked similarity search, descending by score. `filter` clauses
    /// are conjunctive; results below `min_score` are dropped when a
    /// threshold is given.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &QueryFilter,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    async fn delete_by_filter(&self, filter: &QueryFilter) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<IndexStats, StoreError>;
}
