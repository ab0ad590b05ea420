use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use super::StorageError;
use super::types::{EmbeddingModel, StoreStats};
use crate::models::{JurisdictionSet, PassageChunk};
use crate::pipeline::rag::types::{ScoredPassage, VectorSearch};
use crate::pipeline::rag::RagError;

/// In-memory passage index with cosine-similarity search.
///
/// Readers share the lock during queries; ingestion takes it exclusively.
pub struct PassageStore {
    entries: RwLock<Vec<StoredPassage>>,
}

#[derive(Debug, Clone)]
struct StoredPassage {
    passage: PassageChunk,
    embedding: Vec<f32>,
}

impl PassageStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store tagged passages.
    pub fn insert(
        &self,
        passages: Vec<PassageChunk>,
        embedder: &dyn EmbeddingModel,
    ) -> Result<usize, StorageError> {
        if passages.is_empty() {
            return Err(StorageError::EmptyChunks);
        }
        let texts: Vec<&str> = passages.iter().map(|p| p.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        self.insert_embedded(passages, embeddings)
    }

    /// Store passages with precomputed embeddings.
    ///
    /// A document already in the store is replaced as a whole, so its chunks
    /// never mix tag sets from two ingestions.
    pub fn insert_embedded(
        &self,
        passages: Vec<PassageChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, StorageError> {
        if passages.len() != embeddings.len() {
            return Err(StorageError::EmbeddingCount {
                chunks: passages.len(),
                embeddings: embeddings.len(),
            });
        }
        check_consistent_tags(&passages)?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let expected = entries
            .first()
            .map(|e| e.embedding.len())
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(StorageError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        let incoming: BTreeSet<String> = passages
            .iter()
            .map(|p| p.source_document_id.clone())
            .collect();
        entries.retain(|e| !incoming.contains(&e.passage.source_document_id));

        let count = passages.len();
        entries.extend(
            passages
                .into_iter()
                .zip(embeddings)
                .map(|(passage, embedding)| StoredPassage { passage, embedding }),
        );

        tracing::debug!(stored = count, total = entries.len(), "Passages stored");
        Ok(count)
    }

    /// Drop every chunk of a document, returning how many were removed.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.passage.source_document_id != document_id);
        before - entries.len()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.passage.source_document_id == document_id)
    }

    pub fn stats(&self) -> StoreStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let documents: BTreeSet<&str> = entries
            .iter()
            .map(|e| e.passage.source_document_id.as_str())
            .collect();
        StoreStats {
            document_count: documents.len(),
            chunk_count: entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PassageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorSearch for PassageStore {
    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<(f32, &StoredPassage)> = entries
            .iter()
            .map(|entry| (cosine_similarity(query_embedding, &entry.embedding), entry))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| ScoredPassage {
                passage: entry.passage.clone(),
                score,
            })
            .collect())
    }
}

fn check_consistent_tags(passages: &[PassageChunk]) -> Result<(), StorageError> {
    let mut seen: HashMap<&str, &JurisdictionSet> = HashMap::new();
    for passage in passages {
        let first = seen
            .entry(passage.source_document_id.as_str())
            .or_insert(&passage.jurisdictions);
        if **first != passage.jurisdictions {
            return Err(StorageError::InconsistentTags {
                document_id: passage.source_document_id.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::embedder::HashingEmbedder;

    fn passage(doc: &str, ordinal: usize, content: &str, tags: &[&str]) -> PassageChunk {
        PassageChunk {
            content: content.to_string(),
            source_document_id: doc.to_string(),
            jurisdictions: tags.iter().copied().collect(),
            ordinal,
        }
    }

    #[test]
    fn insert_and_stats() {
        let store = PassageStore::new();
        let embedder = HashingEmbedder::new();
        store
            .insert(
                vec![
                    passage("doc-a", 0, "Gifts must be declared", &["GLOBAL"]),
                    passage("doc-a", 1, "Meals under $50 are fine", &["GLOBAL"]),
                ],
                &embedder,
            )
            .unwrap();
        store
            .insert(vec![passage("doc-b", 0, "Karaoke is prohibited", &["JP"])], &embedder)
            .unwrap();

        assert_eq!(
            store.stats(),
            StoreStats {
                document_count: 2,
                chunk_count: 3
            }
        );
        assert!(store.contains_document("doc-b"));
        assert!(!store.contains_document("doc-c"));
    }

    #[test]
    fn reingest_replaces_document() {
        let store = PassageStore::new();
        let embedder = HashingEmbedder::new();
        store
            .insert(vec![passage("doc-a", 0, "old", &["GLOBAL"]), passage("doc-a", 1, "old two", &["GLOBAL"])], &embedder)
            .unwrap();
        store
            .insert(vec![passage("doc-a", 0, "new", &["JP"])], &embedder)
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn inconsistent_tags_are_rejected() {
        let store = PassageStore::new();
        let err = store
            .insert(
                vec![passage("doc-a", 0, "one", &["JP"]), passage("doc-a", 1, "two", &["DE"])],
                &HashingEmbedder::new(),
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::InconsistentTags { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let store = PassageStore::new();
        let err = store
            .insert_embedded(vec![passage("doc-a", 0, "one", &["JP"])], vec![])
            .unwrap_err();
        assert!(matches!(err, StorageError::EmbeddingCount { chunks: 1, embeddings: 0 }));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let store = PassageStore::new();
        store
            .insert_embedded(vec![passage("doc-a", 0, "one", &["JP"])], vec![vec![1.0, 0.0]])
            .unwrap();
        let err = store
            .insert_embedded(vec![passage("doc-b", 0, "two", &["JP"])], vec![vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, StorageError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn empty_insert_is_rejected() {
        let err = PassageStore::new()
            .insert(vec![], &HashingEmbedder::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::EmptyChunks));
    }

    #[test]
    fn search_orders_by_similarity() {
        let store = PassageStore::new();
        store
            .insert_embedded(
                vec![
                    passage("doc-a", 0, "far", &["GLOBAL"]),
                    passage("doc-b", 0, "near", &["GLOBAL"]),
                ],
                vec![vec![0.0, 1.0], vec![1.0, 0.1]],
            )
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.content, "near");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_respects_top_k() {
        let store = PassageStore::new();
        let passages: Vec<PassageChunk> = (0..5)
            .map(|i| passage(&format!("doc-{i}"), 0, "text", &["GLOBAL"]))
            .collect();
        store
            .insert_embedded(passages, vec![vec![1.0, 0.0]; 5])
            .unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 3).unwrap().len(), 3);
    }

    #[test]
    fn remove_document_drops_its_chunks() {
        let store = PassageStore::new();
        store
            .insert_embedded(
                vec![passage("doc-a", 0, "a", &["JP"]), passage("doc-b", 0, "b", &["JP"])],
                vec![vec![1.0], vec![1.0]],
            )
            .unwrap();
        assert_eq!(store.remove_document("doc-a"), 1);
        assert_eq!(store.stats().document_count, 1);
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
