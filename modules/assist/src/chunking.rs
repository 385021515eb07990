//! Word-window chunking with overlap.

use crate::domain::{DocumentChunk, Metadata};
use serde_json::json;
use uuid::Uuid;

pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            // the window must advance
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split `text` into overlapping word windows.
    ///
    /// Chunk ids are deterministic (UUIDv5 over `doc_id` + window offset),
    /// so re-indexing the same document overwrites its chunks instead of
    /// duplicating them.
    pub fn chunk_text(&self, text: &str, doc_id: &str) -> Vec<DocumentChunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let window = &words[start..(start + self.chunk_size).min(words.len())];

            let mut metadata = Metadata::new();
            metadata.insert("doc_id".into(), json!(doc_id));
            metadata.insert("chunk_index".into(), json!(chunks.len()));
            metadata.insert("word_count".into(), json!(window.len()));

            chunks.push(DocumentChunk {
                id: chunk_id(doc_id, start),
                content: window.join(" "),
                embedding: None,
                metadata,
            });

            start += step;
        }

        chunks
    }
}

fn chunk_id(doc_id: &str, offset: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{doc_id}_{offset}").as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = Chunker::new(500, 50).chunk_text(&words(10), "doc-1");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["word_count"], 10);
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
    }

    #[test]
    fn windows_overlap() {
        let chunks = Chunker::new(10, 3).chunk_text(&words(20), "doc-1");
        // step 7: offsets 0, 7, 14
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].content.ends_with("w9"));
        assert!(chunks[1].content.starts_with("w7"));
        assert_eq!(chunks[2].metadata["word_count"], 6);
    }

    #[test]
    fn ids_are_deterministic_per_document() {
        let chunker = Chunker::new(10, 3);
        let first = chunker.chunk_text(&words(20), "doc-1");
        let again = chunker.chunk_text(&words(20), "doc-1");
        let other = chunker.chunk_text(&words(20), "doc-2");

        assert_eq!(first[0].id, again[0].id);
        assert_ne!(first[0].id, other[0].id);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(Chunker::new(500, 50).chunk_text("   ", "doc-1").is_empty());
    }
}
