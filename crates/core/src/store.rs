use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{IndexStats, ManualChunk, QueryFilter};
use crate::traits::{IndexRecord, ScoredChunk, VectorIndex};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_RETRIEVAL_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upsert batch size; bounded to respect provider payload limits.
    pub batch_size: usize,
    pub retrieval_k: usize,
    pub similarity_threshold: f32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Owns every interaction with the vector database: index lifecycle,
/// batched insertion, filtered similarity search and gated deletion.
/// Per-call `k` and filter parameters make it safe to share one
/// manager across queries without reconfiguring it.
pub struct VectorStoreManager<V: VectorIndex> {
    index: V,
    embedder: Arc<dyn Embedder>,
    options: StoreOptions,
}

impl<V: VectorIndex + Send + Sync> VectorStoreManager<V> {
    pub fn new(index: V, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_options(index, embedder, StoreOptions::default())
    }

    pub fn with_options(index: V, embedder: Arc<dyn Embedder>, options: StoreOptions) -> Self {
        Self {
            index,
            embedder,
            options,
        }
    }

    pub fn retrieval_k(&self) -> usize {
        self.options.retrieval_k
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.options.similarity_threshold
    }

    /// Create-if-absent for the backing index, keyed on the embedder's
    /// dimension. Safe to call repeatedly.
    pub async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.index.ensure_index(self.embedder.dimensions()).await
    }

    /// Embeds and upserts chunks in bounded batches. An empty input is
    /// a warned no-op, not an error. Returns the number of records
    /// written.
    pub async fn index_chunks(&self, chunks: &[ManualChunk]) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            warn!("no chunks to index");
            return Ok(0);
        }

        self.ensure_ready().await?;

        let mut indexed = 0usize;
        for batch in chunks.chunks(self.options.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            let mut records = Vec::with_capacity(batch.len());
            for (chunk, embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != self.embedder.dimensions() {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.embedder.dimensions(),
                        got: embedding.len(),
                    });
                }
                records.push(IndexRecord {
                    id: record_id(chunk),
                    embedding,
                    chunk: chunk.clone(),
                });
            }

            self.index.upsert(&records).await?;
            indexed += records.len();
        }

        info!(indexed, "indexed chunks");
        Ok(indexed)
    }

    /// Ranked similarity search with an optional conjunctive metadata
    /// filter. `k` falls back to the configured retrieval count.
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let vector = self.embedder.embed(query).await?;
        let k = k.unwrap_or(self.options.retrieval_k);
        self.index.query(&vector, k, filter, None).await
    }

    /// Same as `search` but drops results scoring below `threshold`.
    /// The result is a subset of the unthresholded search in the same
    /// relative order, never padded back up to `k`.
    pub async fn search_with_threshold(
        &self,
        query: &str,
        k: Option<usize>,
        filter: &QueryFilter,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let vector = self.embedder.embed(query).await?;
        let k = k.unwrap_or(self.options.retrieval_k);
        let threshold = threshold.unwrap_or(self.options.similarity_threshold);
        self.index.query(&vector, k, filter, Some(threshold)).await
    }

    /// Removes every vector from the index. Refused with
    /// `StoreError::ConfirmationRequired` unless `confirmed` is set.
    pub async fn delete_all(&self, confirmed: bool) -> Result<(), StoreError> {
        if !confirmed {
            warn!("delete_all refused: confirmation flag not set");
            return Err(StoreError::ConfirmationRequired("delete_all"));
        }
        self.index.delete_all().await
    }

    /// Removes vectors matching a metadata filter, behind the same
    /// confirmation gate as `delete_all`.
    pub async fn delete_by_filter(
        &self,
        filter: &QueryFilter,
        confirmed: bool,
    ) -> Result<(), StoreError> {
        if !confirmed {
            warn!(?filter, "delete_by_filter refused: confirmation flag not set");
            return Err(StoreError::ConfirmationRequired("delete_by_filter"));
        }
        self.index.delete_by_filter(filter).await
    }

    pub async fn stats(&self) -> Result<IndexStats, StoreError> {
        self.index.stats().await
    }
}

/// Deterministic record id derived from the chunk's identity, so
/// re-ingesting the same corpus upserts over the existing records
/// instead of duplicating them.
pub fn record_id(chunk: &ManualChunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.metadata.source_path.as_bytes());
    hasher.update(chunk.metadata.page.to_le_bytes());
    hasher.update(chunk.content.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeIndex;
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::metadata::extract_from_filename;

    fn chunk(content: &str, filename: &str) -> ManualChunk {
        let mut metadata = extract_from_filename(filename);
        metadata.page = 1;
        metadata.source_path = format!("/manuali/{filename}");
        ManualChunk {
            content: content.to_string(),
            metadata,
        }
    }

    fn manager_with(options: StoreOptions) -> VectorStoreManager<FakeIndex> {
        VectorStoreManager::with_options(
            FakeIndex::default(),
            Arc::new(HashEmbedder::default()),
            options,
        )
    }

    fn manager() -> VectorStoreManager<FakeIndex> {
        manager_with(StoreOptions::default())
    }

    #[tokio::test]
    async fn indexing_empty_input_is_a_noop() {
        let manager = manager();
        let indexed = manager.index_chunks(&[]).await.unwrap();
        assert_eq!(indexed, 0);
        assert!(manager.index.ensure_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn indexing_respects_batch_size() {
        let manager = manager_with(StoreOptions {
            batch_size: 2,
            ..StoreOptions::default()
        });

        let chunks: Vec<ManualChunk> = (0..5)
            .map(|n| chunk(&format!("contenuto {n}"), "FIAT_500_2020_Officina.pdf"))
            .collect();

        let indexed = manager.index_chunks(&chunks).await.unwrap();
        assert_eq!(indexed, 5);
        assert_eq!(*manager.index.upsert_batches.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn ensure_ready_is_idempotent() {
        let manager = manager();
        manager.ensure_ready().await.unwrap();
        manager.ensure_ready().await.unwrap();
        let calls = manager.index.ensure_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|&dimension| dimension == 128));
    }

    #[tokio::test]
    async fn reindexing_same_chunks_does_not_duplicate_records() {
        let manager = manager();
        let chunks = vec![chunk("Coppia di serraggio: 25 Nm", "FIAT_500_2020_Officina.pdf")];
        manager.index_chunks(&chunks).await.unwrap();
        manager.index_chunks(&chunks).await.unwrap();
        assert_eq!(manager.index.record_count(), 1);
    }

    #[tokio::test]
    async fn threshold_search_returns_ordered_subset_of_plain_search() {
        let manager = manager();
        manager
            .index_chunks(&[
                chunk("coppia di serraggio testata 25 Nm", "FIAT_500_2020_Officina.pdf"),
                chunk("capacità serbatoio carburante 35 litri", "FIAT_500_2020_Officina.pdf"),
                chunk("schema impianto frenante", "OPEL_Corsa_2019_Officina.pdf"),
            ])
            .await
            .unwrap();

        let all = manager
            .search("coppia di serraggio", None, &QueryFilter::new())
            .await
            .unwrap();
        let thresholded = manager
            .search_with_threshold("coppia di serraggio", None, &QueryFilter::new(), Some(0.3))
            .await
            .unwrap();

        assert!(thresholded.len() <= all.len());
        assert!(thresholded.iter().all(|hit| hit.score >= 0.3));

        let all_contents: Vec<&str> = all.iter().map(|hit| hit.chunk.content.as_str()).collect();
        let subset_contents: Vec<&str> = thresholded
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect();
        let mut remaining = all_contents.iter();
        for content in &subset_contents {
            assert!(
                remaining.any(|candidate| candidate == content),
                "threshold result out of order"
            );
        }
    }

    #[tokio::test]
    async fn search_applies_metadata_filter_at_the_store() {
        let manager = manager();
        manager
            .index_chunks(&[
                chunk("procedura cambio olio", "FIAT_500_2020_Officina.pdf"),
                chunk("procedura cambio olio", "OPEL_Corsa_2019_Officina.pdf"),
            ])
            .await
            .unwrap();

        let hits = manager
            .search("cambio olio", None, &QueryFilter::new().brand("FIAT"))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.brand.as_deref(), Some("FIAT"));
    }

    #[tokio::test]
    async fn unconfirmed_deletes_are_refused_and_leave_the_index_unchanged() {
        let manager = manager();
        manager
            .index_chunks(&[chunk("testo", "FIAT_500_2020_Officina.pdf")])
            .await
            .unwrap();

        let refused = manager.delete_all(false).await;
        assert!(matches!(refused, Err(StoreError::ConfirmationRequired(_))));
        assert_eq!(manager.index.record_count(), 1);

        let refused = manager
            .delete_by_filter(&QueryFilter::new().brand("FIAT"), false)
            .await;
        assert!(matches!(refused, Err(StoreError::ConfirmationRequired(_))));
        assert_eq!(manager.index.record_count(), 1);

        manager.delete_all(true).await.unwrap();
        assert_eq!(manager.index.record_count(), 0);
    }

    #[tokio::test]
    async fn confirmed_filtered_delete_removes_only_matching_records() {
        let manager = manager();
        manager
            .index_chunks(&[
                chunk("testo fiat", "FIAT_500_2020_Officina.pdf"),
                chunk("testo opel", "OPEL_Corsa_2019_Officina.pdf"),
            ])
            .await
            .unwrap();

        manager
            .delete_by_filter(&QueryFilter::new().brand("FIAT"), true)
            .await
            .unwrap();

        assert_eq!(manager.index.record_count(), 1);
        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.total_vector_count, 1);
    }

    #[test]
    fn record_ids_are_deterministic_and_content_sensitive() {
        let first = chunk("testo", "FIAT_500_2020_Officina.pdf");
        let second = chunk("testo", "FIAT_500_2020_Officina.pdf");
        let different = chunk("altro testo", "FIAT_500_2020_Officina.pdf");

        assert_eq!(record_id(&first), record_id(&second));
        assert_ne!(record_id(&first), record_id(&different));
    }
}
