use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use super::aggregate::{aggregate, AggregateAnswer};
use super::decompose::{Decomposition, GenerativeRestater, QueryDecomposer, QueryRestater};
use super::ollama::OllamaClient;
use super::parser::ParseStrategy;
use super::retrieval::ScopedRetriever;
use super::synthesis::Synthesizer;
use super::types::{
    Diagnostic, Judgment, JudgmentOrigin, LlmGenerate, RetrievalResult, RetrievalStatus, SubQuery,
    GENERAL_ENTITY,
};
use super::RagError;
use crate::config::{ConfigError, EngineConfig};
use crate::models::{DiagnosticStage, PassageChunk};
use crate::pipeline::jurisdiction::{EntityDetector, JurisdictionRegistry};
use crate::pipeline::safety::{sanitize_question, EscalationTable};
use crate::pipeline::storage::chunker::PolicyChunker;
use crate::pipeline::storage::tagger::IngestionTagger;
use crate::pipeline::storage::types::{Chunker, EmbeddingModel, StoreStats};
use crate::pipeline::storage::vectordb::PassageStore;
use crate::pipeline::storage::StorageError;

/// Question pipeline and ingestion entry point.
///
/// sanitize → decompose → retrieve (concurrent) → judge (concurrent, isolated)
/// → parse → escalate → aggregate.
///
/// Blocking collaborator calls run on tokio's blocking pool, never more than
/// `max_workers` at once however many entities a question names.
pub struct ComplianceEngine {
    config: EngineConfig,
    detector: EntityDetector,
    decomposer: QueryDecomposer,
    tagger: IngestionTagger,
    chunker: PolicyChunker,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<PassageStore>,
    retriever: ScopedRetriever,
    synthesizer: Synthesizer,
    escalation: Arc<EscalationTable>,
    workers: Arc<Semaphore>,
}

impl ComplianceEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<PassageStore>,
        generator: Arc<dyn LlmGenerate>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let detector = EntityDetector::new(Arc::new(JurisdictionRegistry::builtin()));
        let retriever = ScopedRetriever::new(
            Arc::clone(&embedder),
            store.clone(),
            config.widened_top_k,
        );
        let synthesizer = Synthesizer::new(generator, config.max_context_chars);

        Ok(Self {
            decomposer: QueryDecomposer::with_template(detector.clone()),
            tagger: IngestionTagger::new(detector.clone()),
            chunker: PolicyChunker::new(),
            workers: Arc::new(Semaphore::new(config.max_workers)),
            escalation: Arc::new(EscalationTable::builtin()),
            detector,
            embedder,
            store,
            retriever,
            synthesizer,
            config,
        })
    }

    /// Engine backed by one Ollama instance for both embeddings and judgments.
    pub fn with_ollama(config: EngineConfig) -> Result<Self, RagError> {
        let client = Arc::new(OllamaClient::from_config(&config)?);
        tracing::info!(
            url = client.base_url(),
            model = client.model(),
            "Using Ollama collaborators"
        );
        Self::new(config, client.clone(), Arc::new(PassageStore::new()), client)
            .map_err(|e| RagError::HttpClient(e.to_string()))
    }

    /// Replace the entity table. Detection, restatement and tagging all follow it.
    pub fn with_registry(mut self, registry: JurisdictionRegistry) -> Self {
        let detector = EntityDetector::new(Arc::new(registry));
        self.decomposer = QueryDecomposer::with_template(detector.clone());
        self.tagger = IngestionTagger::new(detector.clone());
        self.detector = detector;
        self
    }

    pub fn with_escalation_table(mut self, table: EscalationTable) -> Self {
        self.escalation = Arc::new(table);
        self
    }

    pub fn with_restater(mut self, restater: Arc<dyn QueryRestater>) -> Self {
        self.decomposer = QueryDecomposer::new(self.detector.clone(), restater);
        self
    }

    /// Multi-entity questions are restated by the generator instead of by template.
    pub fn with_generative_restatement(self) -> Self {
        let restater = Arc::new(GenerativeRestater::new(self.synthesizer.generator()));
        self.with_restater(restater)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PassageStore> {
        &self.store
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    // ── Ingestion ───────────────────────────────────────────

    /// Tag pre-chunked text from the whole document's declared scope and store it.
    ///
    /// Blocking (embeds every chunk). Re-ingesting the same text replaces it.
    pub fn ingest_document<S: AsRef<str>>(
        &self,
        document_text: &str,
        raw_chunks: &[S],
    ) -> Result<Vec<PassageChunk>, RagError> {
        let passages = self.tagger.tag(document_text, raw_chunks);
        let Some(first) = passages.first() else {
            return Err(StorageError::EmptyChunks.into());
        };

        let document_id = first.source_document_id.clone();
        let scope = first.jurisdictions.clone();
        let stored = self.store.insert(passages.clone(), self.embedder.as_ref())?;

        tracing::info!(
            document_id = %document_id,
            chunks = stored,
            scope = %scope,
            "Policy document ingested"
        );
        Ok(passages)
    }

    /// Chunk, tag and store a whole document.
    pub fn ingest_text(&self, document_text: &str) -> Result<Vec<PassageChunk>, RagError> {
        let chunks: Vec<String> = self
            .chunker
            .chunk(document_text)
            .into_iter()
            .map(|c| c.content)
            .collect();
        self.ingest_document(document_text, &chunks)
    }

    // ── Questions ───────────────────────────────────────────

    /// Answer one question. Never fails: every collaborator error becomes a
    /// conservative judgment plus a diagnostic.
    pub async fn process_question(&self, question: &str) -> AggregateAnswer {
        let request_id = Uuid::new_v4();
        let deadline = Instant::now() + self.config.request_timeout;
        let mut diagnostics = Vec::new();

        tracing::info!(
            request_id = %request_id,
            question_len = question.len(),
            "Processing compliance question"
        );

        let sub_queries = match sanitize_question(question, self.config.max_question_chars) {
            Ok(sanitized) => {
                for modification in &sanitized.modifications {
                    diagnostics.push(Diagnostic::new(
                        GENERAL_ENTITY,
                        DiagnosticStage::Sanitize,
                        modification.description.as_str(),
                    ));
                }
                let decomposition = self.decompose(sanitized.text, deadline).await;
                diagnostics.extend(decomposition.diagnostics);
                decomposition.sub_queries
            }
            Err(e) => {
                // Nothing of the raw text may reach a prompt.
                tracing::warn!(request_id = %request_id, error = %e, "Question unusable after sanitization");
                diagnostics.push(Diagnostic::new(
                    GENERAL_ENTITY,
                    DiagnosticStage::Sanitize,
                    e.to_string(),
                ));
                return aggregate(
                    request_id,
                    question,
                    vec![SubQuery::universal("")],
                    vec![Judgment::unavailable(
                        GENERAL_ENTITY,
                        "the question was empty after input filtering",
                    )],
                    diagnostics,
                );
            }
        };

        let (retrievals, retrieval_diagnostics) = self.retrieve_all(&sub_queries, deadline).await;
        diagnostics.extend(retrieval_diagnostics);

        let (judgments, judgment_diagnostics) = self.judge_all(&retrievals, deadline).await;
        diagnostics.extend(judgment_diagnostics);

        let answer = aggregate(request_id, question, sub_queries, judgments, diagnostics);

        tracing::info!(
            request_id = %request_id,
            entities = answer.per_entity.len(),
            overall = %answer.overall_risk_level(),
            degraded = answer.is_degraded(),
            "Compliance question answered"
        );
        answer
    }

    /// Structural failures fall back to one universal-only sub-query.
    async fn decompose(&self, question: String, deadline: Instant) -> Decomposition {
        let decomposer = self.decomposer.clone();
        let text = question.clone();
        let call = run_blocking(Arc::clone(&self.workers), move || decomposer.decompose(&text));

        let failure = match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(decomposition)) => return decomposition,
            Ok(Err(e)) => format!("Decomposition failed ({e}); universal scope used"),
            Err(_) => "Decomposition exceeded the request deadline; universal scope used".to_string(),
        };

        tracing::warn!(reason = %failure, "Falling back to universal-only retrieval");
        Decomposition {
            sub_queries: vec![SubQuery::universal(question)],
            diagnostics: vec![Diagnostic::new(
                GENERAL_ENTITY,
                DiagnosticStage::Decompose,
                failure,
            )],
        }
    }

    /// One result per sub-query, in input order. A failed or unfinished
    /// retrieval degrades to an empty result plus a diagnostic.
    pub async fn retrieve_all(
        &self,
        sub_queries: &[SubQuery],
        deadline: Instant,
    ) -> (Vec<RetrievalResult>, Vec<Diagnostic>) {
        let mut tasks = JoinSet::new();
        for (index, sub_query) in sub_queries.iter().enumerate() {
            let retriever = self.retriever.clone();
            let sub_query = sub_query.clone();
            let workers = Arc::clone(&self.workers);
            let k = self.config.top_k;
            tasks.spawn(async move {
                let outcome = run_blocking(workers, move || retriever.retrieve(&sub_query, k))
                    .await
                    .and_then(|result| result);
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<RetrievalResult, RagError>>> =
            sub_queries.iter().map(|_| None).collect();
        let finished = collect_indexed(&mut tasks, &mut slots, deadline).await;

        let mut diagnostics = Vec::new();
        let results = sub_queries
            .iter()
            .zip(slots)
            .map(|(sub_query, slot)| {
                let entity = sub_query.entity_name();
                match slot {
                    Some(Ok(result)) => result,
                    Some(Err(e)) => {
                        tracing::warn!(entity, error = %e, "Retrieval failed");
                        diagnostics.push(Diagnostic::new(
                            entity,
                            DiagnosticStage::Retrieval,
                            e.to_string(),
                        ));
                        RetrievalResult::empty(sub_query.clone(), RetrievalStatus::Failed)
                    }
                    None if !finished => {
                        tracing::warn!(entity, "Retrieval abandoned at request deadline");
                        diagnostics.push(Diagnostic::new(
                            entity,
                            DiagnosticStage::Timeout,
                            "Retrieval did not finish before the request deadline",
                        ));
                        RetrievalResult::empty(sub_query.clone(), RetrievalStatus::TimedOut)
                    }
                    None => {
                        diagnostics.push(Diagnostic::new(
                            entity,
                            DiagnosticStage::Retrieval,
                            "Retrieval worker aborted",
                        ));
                        RetrievalResult::empty(sub_query.clone(), RetrievalStatus::Failed)
                    }
                }
            })
            .collect();

        (results, diagnostics)
    }

    /// One escalated judgment per retrieval, in input order. The generator
    /// only runs for entities with in-scope passages.
    async fn judge_all(
        &self,
        retrievals: &[RetrievalResult],
        deadline: Instant,
    ) -> (Vec<Judgment>, Vec<Diagnostic>) {
        let mut judgments: Vec<Option<Judgment>> = Vec::with_capacity(retrievals.len());
        let mut tasks = JoinSet::new();

        for (index, retrieval) in retrievals.iter().enumerate() {
            let entity = retrieval.sub_query.entity_name();
            let settled = match retrieval.status {
                RetrievalStatus::TimedOut => {
                    Some(Judgment::unavailable(entity, "policy retrieval did not finish in time"))
                }
                RetrievalStatus::Failed => Some(Judgment::safe_default(
                    entity,
                    format!("Policy retrieval failed for {entity}. Manual review required."),
                    JudgmentOrigin::RetrievalFailure,
                )),
                RetrievalStatus::Complete if retrieval.is_empty() => {
                    tracing::debug!(entity, "No in-scope passages, skipping generation");
                    Some(Judgment::no_policy(entity))
                }
                RetrievalStatus::Complete => None,
            };

            if settled.is_none() {
                let synthesizer = self.synthesizer.clone();
                let retrieval = retrieval.clone();
                let workers = Arc::clone(&self.workers);
                let limit = self.config.generation_timeout;
                tasks.spawn(async move {
                    let outcome = match workers.acquire_owned().await {
                        Ok(permit) => {
                            let call = tokio::task::spawn_blocking(move || {
                                let _permit = permit;
                                synthesizer.judge(&retrieval.sub_query, &retrieval)
                            });
                            // The clock starts once a worker is free.
                            match tokio::time::timeout(limit, call).await {
                                Ok(Ok(raw)) => raw,
                                Ok(Err(e)) => Err(RagError::Worker(e.to_string())),
                                Err(_) => Err(RagError::Timeout(limit)),
                            }
                        }
                        Err(e) => Err(RagError::Worker(e.to_string())),
                    };
                    (index, outcome)
                });
            }
            judgments.push(settled);
        }

        let mut raw_outputs: Vec<Option<Result<String, RagError>>> =
            retrievals.iter().map(|_| None).collect();
        collect_indexed(&mut tasks, &mut raw_outputs, deadline).await;

        let mut diagnostics = Vec::new();
        let finalized = retrievals
            .iter()
            .zip(judgments)
            .zip(raw_outputs)
            .map(|((retrieval, settled), raw)| {
                let entity = retrieval.sub_query.entity_name();
                let judgment = match (settled, raw) {
                    (Some(judgment), _) => judgment,
                    (None, Some(Ok(raw))) => {
                        let (judgment, strategy) = self.synthesizer.finalize(retrieval, &raw);
                        if strategy == ParseStrategy::SafeDefault {
                            diagnostics.push(Diagnostic::new(
                                entity,
                                DiagnosticStage::Parse,
                                "Generator output could not be parsed",
                            ));
                        }
                        judgment
                    }
                    (None, Some(Err(e))) => {
                        tracing::warn!(entity, error = %e, "Generation failed");
                        let stage = match e {
                            RagError::Timeout(_) => DiagnosticStage::Timeout,
                            _ => DiagnosticStage::Generation,
                        };
                        diagnostics.push(Diagnostic::new(entity, stage, e.to_string()));
                        Judgment::safe_default(
                            entity,
                            format!("Risk assessment for {entity} could not be generated. Manual review required."),
                            JudgmentOrigin::GeneratorFailure,
                        )
                    }
                    (None, None) => {
                        tracing::warn!(entity, "No judgment before request deadline");
                        diagnostics.push(Diagnostic::new(
                            entity,
                            DiagnosticStage::Timeout,
                            "Judgment did not finish before the request deadline",
                        ));
                        Judgment::unavailable(entity, "request deadline exceeded")
                    }
                };
                self.escalation.escalate(&judgment, retrieval)
            })
            .collect();

        (finalized, diagnostics)
    }
}

/// Run a blocking call on the bounded worker pool.
///
/// The permit travels with the blocking closure: a caller that stops waiting
/// (timeout, abort) does not free the worker until the call really returns.
async fn run_blocking<T, F>(workers: Arc<Semaphore>, f: F) -> Result<T, RagError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let permit = workers
        .acquire_owned()
        .await
        .map_err(|e| RagError::Worker(e.to_string()))?;
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        f()
    })
    .await
    .map_err(|e| RagError::Worker(e.to_string()))
}

/// Drain `tasks` into `slots` by index. Returns false if the deadline cut
/// collection short; unfinished tasks are aborted and their slots stay empty.
async fn collect_indexed<T: Send + 'static>(
    tasks: &mut JoinSet<(usize, T)>,
    slots: &mut [Option<T>],
    deadline: Instant,
) -> bool {
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((index, value)))) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(value);
                }
            }
            Ok(Some(Err(e))) => tracing::warn!(error = %e, "Worker task aborted"),
            Ok(None) => return true,
            Err(_) => {
                tasks.abort_all();
                return false;
            }
        }
    }
}
