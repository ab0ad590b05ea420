use std::sync::Arc;

use super::types::{RetrievalResult, RetrievalStatus, ScoredPassage, SubQuery, VectorSearch};
use super::RagError;
use crate::pipeline::storage::types::EmbeddingModel;

/// Nearest-neighbor search filtered to a sub-query's jurisdictions.
///
/// Never returns a passage outside `allowed_jurisdictions`: when filtering
/// empties the result, the search widens once and otherwise comes back empty.
#[derive(Clone)]
pub struct ScopedRetriever {
    embedder: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorSearch>,
    widened_top_k: usize,
}

impl ScopedRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorSearch>,
        widened_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            widened_top_k,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embedder
    }

    /// Blocking retrieval for one sub-query with initial breadth `k`.
    pub fn retrieve(&self, sub_query: &SubQuery, k: usize) -> Result<RetrievalResult, RagError> {
        let query_embedding = self
            .embedder
            .embed(&sub_query.query_text)
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;

        let candidates = self.index.search(&query_embedding, k)?;
        let candidate_count = candidates.len();
        let mut passages = in_scope(sub_query, candidates);
        let mut widened = false;

        // A short candidate list already covered the whole index.
        let widened_k = self.widened_top_k.max(k);
        if passages.is_empty() && candidate_count >= k && widened_k > k {
            widened = true;
            let candidates = self.index.search(&query_embedding, widened_k)?;
            passages = in_scope(sub_query, candidates);
        }

        tracing::debug!(
            entity = sub_query.entity_name(),
            allowed = %sub_query.allowed_jurisdictions,
            candidates = candidate_count,
            passages = passages.len(),
            widened,
            "Scoped retrieval complete"
        );

        Ok(RetrievalResult {
            sub_query: sub_query.clone(),
            passages,
            widened,
            status: RetrievalStatus::Complete,
        })
    }
}

/// Candidates whose jurisdictions overlap the sub-query's, rank order kept.
fn in_scope(sub_query: &SubQuery, candidates: Vec<ScoredPassage>) -> Vec<ScoredPassage> {
    candidates
        .into_iter()
        .filter(|c| c.passage.jurisdictions.intersects(&sub_query.allowed_jurisdictions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::{EntityMatch, JurisdictionSet, PassageChunk};
    use crate::pipeline::storage::embedder::HashingEmbedder;
    use crate::pipeline::storage::vectordb::PassageStore;
    use crate::pipeline::storage::StorageError;

    /// Returns a fixed candidate list (truncated to k) and counts calls.
    struct FixedIndex {
        candidates: Vec<ScoredPassage>,
        calls: AtomicUsize,
    }

    impl VectorSearch for FixedIndex {
        fn search(&self, _q: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.iter().take(top_k).cloned().collect())
        }
    }

    struct FailingIndex;

    impl VectorSearch for FailingIndex {
        fn search(&self, _q: &[f32], _k: usize) -> Result<Vec<ScoredPassage>, RagError> {
            Err(RagError::VectorSearch("index offline".into()))
        }
    }

    struct FailingEmbedder;

    impl EmbeddingModel for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, StorageError> {
            Err(StorageError::Embedding("model missing".into()))
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    fn scored(doc: &str, tags: &[&str], score: f32) -> ScoredPassage {
        ScoredPassage {
            passage: PassageChunk {
                content: format!("content of {doc}"),
                source_document_id: doc.to_string(),
                jurisdictions: tags.iter().copied().collect(),
                ordinal: 0,
            },
            score,
        }
    }

    fn j1_query() -> SubQuery {
        SubQuery::for_entity(
            EntityMatch {
                name: "J1".into(),
                aliases_matched: "j1".into(),
                jurisdictions: ["J1"].into_iter().collect(),
            },
            "Can I do K in J1?",
        )
    }

    fn retriever(index: Arc<dyn VectorSearch>) -> ScopedRetriever {
        ScopedRetriever::new(Arc::new(HashingEmbedder::with_dimension(8)), index, 5)
    }

    #[test]
    fn filters_out_foreign_jurisdictions() {
        let index = Arc::new(FixedIndex {
            candidates: vec![
                scored("j2-doc", &["J2"], 0.9),
                scored("global", &["GLOBAL"], 0.8),
                scored("j1-doc", &["J1"], 0.7),
            ],
            calls: AtomicUsize::new(0),
        });
        let result = retriever(index).retrieve(&j1_query(), 3).unwrap();
        let docs: Vec<&str> = result
            .passages
            .iter()
            .map(|p| p.passage.source_document_id.as_str())
            .collect();
        assert_eq!(docs, vec!["global", "j1-doc"]);
        assert!(!result.widened);
    }

    #[test]
    fn widens_once_when_filter_empties() {
        let index = Arc::new(FixedIndex {
            candidates: vec![
                scored("j2-a", &["J2"], 0.9),
                scored("j2-b", &["J2"], 0.8),
                scored("global", &["GLOBAL"], 0.1),
            ],
            calls: AtomicUsize::new(0),
        });
        let result = retriever(index.clone()).retrieve(&j1_query(), 2).unwrap();
        assert!(result.widened);
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.passages.len(), 1);
        assert_eq!(result.passages[0].passage.source_document_id, "global");
    }

    #[test]
    fn never_falls_back_to_unfiltered_results() {
        let index = Arc::new(FixedIndex {
            candidates: (0..10).map(|i| scored(&format!("j2-{i}"), &["J2"], 0.9)).collect(),
            calls: AtomicUsize::new(0),
        });
        let result = retriever(index.clone()).retrieve(&j1_query(), 3).unwrap();
        assert!(result.is_empty());
        assert!(result.widened);
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn short_candidate_list_skips_widening() {
        let index = Arc::new(FixedIndex {
            candidates: vec![scored("j2", &["J2"], 0.9)],
            calls: AtomicUsize::new(0),
        });
        let result = retriever(index.clone()).retrieve(&j1_query(), 3).unwrap();
        assert!(result.is_empty());
        assert!(!result.widened);
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn universal_query_sees_only_universal_passages() {
        let index = Arc::new(FixedIndex {
            candidates: vec![scored("j1", &["J1"], 0.9), scored("global", &["GLOBAL"], 0.5)],
            calls: AtomicUsize::new(0),
        });
        let result = retriever(index)
            .retrieve(&SubQuery::universal("Any rules?"), 5)
            .unwrap();
        assert_eq!(result.passages.len(), 1);
        assert!(result.passages[0].passage.jurisdictions.is_universal());
    }

    #[test]
    fn backend_errors_propagate() {
        let err = retriever(Arc::new(FailingIndex))
            .retrieve(&j1_query(), 3)
            .unwrap_err();
        assert!(matches!(err, RagError::VectorSearch(_)));

        let err = ScopedRetriever::new(Arc::new(FailingEmbedder), Arc::new(FailingIndex), 5)
            .retrieve(&j1_query(), 3)
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailed(_)));
    }

    #[test]
    fn works_against_passage_store() {
        let embedder = Arc::new(HashingEmbedder::new());
        let store = Arc::new(PassageStore::new());
        store
            .insert(
                vec![PassageChunk {
                    content: "K is prohibited in J2".into(),
                    source_document_id: "j2-doc".into(),
                    jurisdictions: JurisdictionSet::from_iter(["J2"]),
                    ordinal: 0,
                }],
                embedder.as_ref(),
            )
            .unwrap();
        let retriever = ScopedRetriever::new(embedder, store, 25);
        assert!(retriever.retrieve(&j1_query(), 8).unwrap().is_empty());
    }
}
