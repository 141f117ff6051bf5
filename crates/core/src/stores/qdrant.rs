use crate::error::StoreError;
use crate::models::{IndexStats, ManualChunk, ManualMetadata, QueryFilter};
use crate::traits::{IndexRecord, ScoredChunk, VectorIndex};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Vector database client speaking the Qdrant REST API. Collections
/// use the cosine distance; payload carries the chunk content and its
/// manual metadata so hits can be rebuilt without a second lookup.
pub struct QdrantStore {
    client: Client,
    endpoint: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    fn backend_error(&self, details: impl Into<String>) -> StoreError {
        StoreError::BackendResponse {
            backend: "qdrant".to_string(),
            details: details.into(),
        }
    }
}

fn payload_filter(filter: &QueryFilter) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }

    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();

    Some(json!({ "must": must }))
}

fn chunk_payload(chunk: &ManualChunk) -> Value {
    json!({
        "content": chunk.content,
        "brand": chunk.metadata.brand,
        "model": chunk.metadata.model,
        "year": chunk.metadata.year,
        "doc_type": chunk.metadata.doc_type,
        "page": chunk.metadata.page,
        "filename": chunk.metadata.filename,
        "source_path": chunk.metadata.source_path,
        "ocr_processed": chunk.metadata.ocr_processed,
        "indexed_at": Utc::now().to_rfc3339(),
    })
}

fn chunk_from_payload(payload: &Value) -> ManualChunk {
    let text_field = |key: &str| {
        payload
            .pointer(&format!("/{key}"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    ManualChunk {
        content: text_field("content").unwrap_or_default(),
        metadata: ManualMetadata {
            brand: text_field("brand"),
            model: text_field("model"),
            year: text_field("year"),
            doc_type: text_field("doc_type").unwrap_or_default(),
            page: payload
                .pointer("/page")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            filename: text_field("filename").unwrap_or_default(),
            source_path: text_field("source_path").unwrap_or_default(),
            ocr_processed: payload
                .pointer("/ocr_processed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_index(&self, dimension: usize) -> Result<(), StoreError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(self.backend_error(response.status().to_string()));
        }

        info!(collection = %self.collection, dimension, "creating vector collection");

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": dimension,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(format!(
                "collection setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.embedding,
                    "payload": chunk_payload(&record.chunk),
                })
            })
            .collect();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &QueryFilter,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let mut body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });

        if let Some(clauses) = payload_filter(filter) {
            body["filter"] = clauses;
        }
        if let Some(threshold) = min_score {
            body["score_threshold"] = json!(threshold);
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
            results.push(ScoredChunk {
                chunk: chunk_from_payload(&payload),
                score,
            });
        }

        Ok(results)
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        warn!(collection = %self.collection, "deleting all vectors");

        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            // An empty filter matches every point.
            .json(&json!({ "filter": {} }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn delete_by_filter(&self, filter: &QueryFilter) -> Result<(), StoreError> {
        let Some(clauses) = payload_filter(filter) else {
            return Err(StoreError::Request(
                "refusing filtered delete with an empty filter; use delete_all".to_string(),
            ));
        };

        warn!(collection = %self.collection, ?filter, "deleting vectors by filter");

        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": clauses }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status().to_string()));
        }

        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, StoreError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response.status().to_string()));
        }

        let parsed: Value = response.json().await?;
        let total_vector_count = parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let dimension = parsed
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        Ok(IndexStats {
            total_vector_count,
            dimension,
            namespaces: vec![self.collection.clone()],
        })
    }
}
