//! Index and query orchestration.

use crate::chunking::Chunker;
use crate::domain::{Document, ScoredChunk};
use crate::error::{AssistError, AssistResult};
use crate::providers::{ChatProvider, EmbeddingProvider};
use crate::vector_store::VectorStore;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using only the \
provided context. If the context does not contain the answer, say you do not know.";

pub struct IndexDocument {
    chunker: Chunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

#[derive(Debug, Serialize)]
pub struct IndexSummary {
    pub doc_id: String,
    pub chunks_created: usize,
    pub total_words: u64,
}

impl IndexDocument {
    pub fn new(
        chunker: Chunker,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            store,
        }
    }

    pub async fn execute(&self, document: &Document) -> AssistResult<IndexSummary> {
        let mut chunks = self.chunker.chunk_text(&document.content, &document.id);
        if chunks.is_empty() {
            return Ok(IndexSummary {
                doc_id: document.id.clone(),
                chunks_created: 0,
                total_words: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;

        let dimension = vectors
            .first()
            .map(Vec::len)
            .ok_or_else(|| AssistError::Provider("empty embedding batch".into()))?;
        self.store.ensure_collection(dimension).await?;

        let mut total_words = 0u64;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            total_words += chunk
                .metadata
                .get("word_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            chunk
                .metadata
                .insert("doc_title".into(), json!(document.title));
            chunk
                .metadata
                .insert("created_at".into(), json!(document.created_at));
            chunk.embedding = Some(vector);
        }

        self.store.upsert(&chunks).await?;

        tracing::info!(
            doc_id = %document.id,
            chunks = chunks.len(),
            total_words,
            "document indexed"
        );

        Ok(IndexSummary {
            doc_id: document.id.clone(),
            chunks_created: chunks.len(),
            total_words,
        })
    }
}

pub struct RagQuery {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatProvider>,
    default_top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryMetrics {
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub context_chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
    pub model: String,
    pub metrics: QueryMetrics,
}

impl RagQuery {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embeddings,
            store,
            chat,
            default_top_k,
        }
    }

    pub async fn execute(&self, question: &str, top_k: Option<usize>) -> AssistResult<QueryResponse> {
        let started = Instant::now();
        let top_k = top_k.unwrap_or(self.default_top_k).clamp(1, 20);

        let query_vector = self.embeddings.embed(question).await?;
        let sources = self.store.search(&query_vector, top_k).await?;

        let prompt = build_prompt(question, &sources);
        let completion = self.chat.complete(SYSTEM_PROMPT, &prompt).await?;

        Ok(QueryResponse {
            text: completion.text,
            metrics: QueryMetrics {
                latency_ms: started.elapsed().as_millis() as u64,
                input_tokens: completion.input_tokens,
                output_tokens: completion.output_tokens,
                context_chunks: sources.len(),
            },
            sources,
            model: completion.model,
        })
    }
}

fn build_prompt(question: &str, sources: &[ScoredChunk]) -> String {
    if sources.is_empty() {
        return format!("Context: (no relevant documents found)\n\nQuestion: {question}");
    }

    let context = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {}", i + 1, s.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Context:\n{context}\n\nQuestion: {question}")
}
