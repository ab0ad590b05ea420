use std::sync::Arc;

use super::citation::{extract_inline_citations, validate_citations};
use super::parser::{parse_with_strategy, ParseStrategy};
use super::prompt::{build_entity_prompt, RISK_OFFICER_SYSTEM_PROMPT};
use super::types::{Judgment, LlmGenerate, RetrievalResult, SubQuery};
use super::RagError;

/// Per-entity judge. Each call sees one entity's passages and nothing else.
#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn LlmGenerate>,
    max_context_chars: usize,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn LlmGenerate>, max_context_chars: usize) -> Self {
        Self {
            generator,
            max_context_chars,
        }
    }

    pub fn generator(&self) -> Arc<dyn LlmGenerate> {
        Arc::clone(&self.generator)
    }

    pub fn build_prompt(&self, sub_query: &SubQuery, retrieval: &RetrievalResult) -> String {
        build_entity_prompt(sub_query, retrieval, self.max_context_chars)
    }

    /// Blocking generator call for one entity.
    pub fn judge(&self, sub_query: &SubQuery, retrieval: &RetrievalResult) -> Result<String, RagError> {
        let prompt = self.build_prompt(sub_query, retrieval);
        tracing::debug!(
            entity = sub_query.entity_name(),
            passages = retrieval.passages.len(),
            prompt_len = prompt.len(),
            "Generating entity judgment"
        );
        self.generator.generate(RISK_OFFICER_SYSTEM_PROMPT, &prompt)
    }

    /// Turn raw generator output into a judgment with validated citations.
    pub fn finalize(&self, retrieval: &RetrievalResult, raw: &str) -> (Judgment, ParseStrategy) {
        let entity = retrieval.sub_query.entity_name();
        let parsed = parse_with_strategy(entity, raw);
        let mut judgment = parsed.judgment;

        let mut cited = std::mem::take(&mut judgment.citations);
        for id in extract_inline_citations(&judgment.summary) {
            if !cited.contains(&id) {
                cited.push(id);
            }
        }
        judgment.citations = validate_citations(entity, cited, retrieval);

        (judgment, parsed.strategy)
    }
}
