//! Vector storage collaborators: the Qdrant REST API for production and an
//! in-process cosine store for dev/test.

use crate::domain::{DocumentChunk, Metadata, ScoredChunk};
use crate::error::{AssistError, AssistResult};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection when missing (idempotent).
    async fn ensure_collection(&self, vector_size: usize) -> AssistResult<()>;

    /// Insert or overwrite chunks by id. Chunks without embeddings are
    /// ignored.
    async fn upsert(&self, chunks: &[DocumentChunk]) -> AssistResult<()>;

    async fn search(&self, embedding: &[f32], top_k: usize) -> AssistResult<Vec<ScoredChunk>>;
}

/// In-memory store, exact cosine scan.
#[derive(Default)]
pub struct MemoryVectorStore {
    chunks: RwLock<HashMap<String, DocumentChunk>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, _vector_size: usize) -> AssistResult<()> {
        Ok(())
    }

    async fn upsert(&self, chunks: &[DocumentChunk]) -> AssistResult<()> {
        let mut store = self.chunks.write().expect("store lock poisoned");
        for chunk in chunks.iter().filter(|c| c.embedding.is_some()) {
            store.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> AssistResult<Vec<ScoredChunk>> {
        let store = self.chunks.read().expect("store lock poisoned");

        let mut scored: Vec<ScoredChunk> = store
            .values()
            .filter_map(|chunk| {
                let vector = chunk.embedding.as_ref()?;
                Some(ScoredChunk {
                    score: cosine(embedding, vector),
                    chunk: DocumentChunk {
                        id: chunk.id.clone(),
                        content: chunk.content.clone(),
                        embedding: None,
                        metadata: chunk.metadata.clone(),
                    },
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Qdrant over its REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, vector_size: usize) -> AssistResult<()> {
        let exists = self
            .client
            .get(self.collection_url())
            .send()
            .await?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Store(format!(
                "create collection failed ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn upsert(&self, chunks: &[DocumentChunk]) -> AssistResult<()> {
        let points: Vec<serde_json::Value> = chunks
            .iter()
            .filter_map(|chunk| {
                let vector = chunk.embedding.as_ref()?;
                let mut payload = chunk.metadata.clone();
                payload.insert("content".into(), json!(chunk.content));
                Some(json!({
                    "id": chunk.id,
                    "vector": vector,
                    "payload": payload
                }))
            })
            .collect();

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Store(format!(
                "upsert failed ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> AssistResult<Vec<ScoredChunk>> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": embedding,
                "limit": top_k,
                "with_payload": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Store(format!(
                "search failed ({status}): {body}"
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let hits = body
            .get("result")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let chunks = hits
            .into_iter()
            .filter_map(|hit| {
                let id = match hit.get("id") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => return None,
                };
                let score = hit.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
                let mut payload: Metadata = hit
                    .get("payload")
                    .and_then(|p| p.as_object())
                    .cloned()
                    .unwrap_or_default();
                let content = payload
                    .remove("content")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();

                Some(ScoredChunk {
                    score,
                    chunk: DocumentChunk {
                        id,
                        content,
                        embedding: None,
                        metadata: payload,
                    },
                })
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            content: format!("content {id}"),
            embedding: Some(embedding),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn memory_store_ranks_by_cosine() {
        let store = MemoryVectorStore::new();
        store
            .upsert(&[
                chunk("a", vec![1.0, 0.0]),
                chunk("b", vec![0.0, 1.0]),
                chunk("c", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "a");
        assert_eq!(results[1].chunk.id, "c");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = MemoryVectorStore::new();
        store.upsert(&[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[chunk("a", vec![0.0, 1.0])]).await.unwrap();

        let results = store.search(&[0.0, 1.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn chunks_without_embeddings_are_ignored() {
        let store = MemoryVectorStore::new();
        let mut no_vector = chunk("a", vec![]);
        no_vector.embedding = None;
        store.upsert(&[no_vector]).await.unwrap();

        assert!(store.search(&[1.0], 10).await.unwrap().is_empty());
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
