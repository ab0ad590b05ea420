use std::sync::Arc;

use super::prompt::{build_restatement_prompt, RESTATEMENT_SYSTEM_PROMPT};
use super::types::{Diagnostic, LlmGenerate, SubQuery};
use super::RagError;
use crate::models::{DiagnosticStage, EntityMatch};
use crate::pipeline::jurisdiction::matching::replace_phrase;
use crate::pipeline::jurisdiction::EntityDetector;

/// Produces a focused version of a multi-entity question for one entity.
pub trait QueryRestater: Send + Sync {
    fn restate(&self, question: &str, target: &EntityMatch, others: &[EntityMatch]) -> Result<String, RagError>;
}

/// Sub-queries for one question plus any contained failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub sub_queries: Vec<SubQuery>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Splits a question into one independently scoped sub-query per entity.
#[derive(Clone)]
pub struct QueryDecomposer {
    detector: EntityDetector,
    restater: Arc<dyn QueryRestater>,
}

impl QueryDecomposer {
    pub fn new(detector: EntityDetector, restater: Arc<dyn QueryRestater>) -> Self {
        Self { detector, restater }
    }

    /// Template restatement, no generator involved.
    pub fn with_template(detector: EntityDetector) -> Self {
        let restater = Arc::new(TemplateRestater::new(detector.clone()));
        Self::new(detector, restater)
    }

    pub fn detector(&self) -> &EntityDetector {
        &self.detector
    }

    /// Blocking when the restater calls a generator.
    pub fn decompose(&self, question: &str) -> Decomposition {
        let mut entities = self.detector.detect(question);
        let mut diagnostics = Vec::new();

        let sub_queries = match entities.len() {
            0 => vec![SubQuery::universal(question)],
            1 => vec![SubQuery::for_entity(entities.remove(0), question)],
            _ => entities
                .iter()
                .map(|target| {
                    let others: Vec<EntityMatch> = entities
                        .iter()
                        .filter(|e| e.name != target.name)
                        .cloned()
                        .collect();

                    let restated = self
                        .restater
                        .restate(question, target, &others)
                        .and_then(|text| self.check_restatement(question, target, text));

                    match restated {
                        Ok(text) => SubQuery::for_entity(target.clone(), text),
                        Err(e) => {
                            // Original text, but still only this entity's own scope.
                            tracing::warn!(
                                entity = %target.name,
                                error = %e,
                                "Restatement unusable, using original question"
                            );
                            diagnostics.push(Diagnostic::new(
                                target.name.as_str(),
                                DiagnosticStage::Decompose,
                                format!("Restatement failed ({e}); original question used"),
                            ));
                            SubQuery::for_entity(target.clone(), question)
                        }
                    }
                })
                .collect(),
        };

        tracing::info!(
            sub_queries = sub_queries.len(),
            entities = ?sub_queries.iter().map(|s| s.entity_name()).collect::<Vec<_>>(),
            "Question decomposed"
        );

        Decomposition {
            sub_queries,
            diagnostics,
        }
    }

    /// A usable restatement is non-empty, bounded, names its target and no
    /// other known entity.
    fn check_restatement(&self, question: &str, target: &EntityMatch, text: String) -> Result<String, RagError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RagError::Decomposition("empty restatement".into()));
        }
        if text.len() > question.len() * 2 + 200 {
            return Err(RagError::Decomposition("restatement too long".into()));
        }
        if !self.detector.mentions(&text, &target.name) {
            return Err(RagError::Decomposition(format!(
                "restatement does not mention {}",
                target.name
            )));
        }
        if let Some(other) = self
            .detector
            .detect(&text)
            .into_iter()
            .find(|m| m.name != target.name)
        {
            return Err(RagError::Decomposition(format!(
                "restatement mentions {}",
                other.name
            )));
        }
        Ok(text)
    }
}

// ── Template restatement ────────────────────────────────────

const PLACEHOLDER: &str = "\u{1}";

/// Connectors removed together with a dropped entity mention.
const CONNECTORS: &[&str] = &[
    ", and in \u{1}",
    " and in \u{1}",
    ", or in \u{1}",
    " or in \u{1}",
    ", and \u{1}",
    " and \u{1}",
    ", or \u{1}",
    " or \u{1}",
    " vs \u{1}",
    " versus \u{1}",
    ", \u{1}",
    "\u{1} and ",
    "\u{1} or ",
    "\u{1}, ",
    " in \u{1}",
];

/// Keeps the sentences about the target (and sentences about no entity),
/// and strips other entities out of mixed sentences.
#[derive(Debug, Clone)]
pub struct TemplateRestater {
    detector: EntityDetector,
}

impl TemplateRestater {
    pub fn new(detector: EntityDetector) -> Self {
        Self { detector }
    }

    fn drop_mentions(&self, sentence: &str, others: &[EntityMatch]) -> String {
        let mut text = sentence.to_string();
        for other in others {
            let mut aliases: Vec<&String> = self.detector.registry().aliases_of(&other.name).iter().collect();
            // Longer aliases first so "south korea" goes before "korea".
            aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
            for alias in aliases {
                text = replace_phrase(&text, alias, PLACEHOLDER);
            }
        }
        for connector in CONNECTORS {
            text = text.replace(connector, "");
        }
        text.replace(PLACEHOLDER, "")
    }
}

impl QueryRestater for TemplateRestater {
    fn restate(&self, question: &str, target: &EntityMatch, others: &[EntityMatch]) -> Result<String, RagError> {
        let mut kept: Vec<String> = Vec::new();

        for sentence in split_sentences(question) {
            let about_target = self.detector.mentions(sentence, &target.name);
            let about_other = others
                .iter()
                .any(|o| self.detector.mentions(sentence, &o.name));

            match (about_target, about_other) {
                (_, false) => kept.push(sentence.trim().to_string()),
                (true, true) => kept.push(self.drop_mentions(sentence, others).trim().to_string()),
                (false, true) => {}
            }
        }

        let mut text = kept
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Err(RagError::Decomposition("no sentence left for target".into()));
        }
        if !self.detector.mentions(&text, &target.name) {
            text.push_str(&format!(" (Jurisdiction: {})", target.name));
        }
        Ok(text)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '?', '!', ';', '\n'])
        .filter(|s| !s.trim().is_empty())
        .collect()
}

// ── Generative restatement ──────────────────────────────────

/// Asks the generator for the focused question.
pub struct GenerativeRestater {
    generator: Arc<dyn LlmGenerate>,
}

impl GenerativeRestater {
    pub fn new(generator: Arc<dyn LlmGenerate>) -> Self {
        Self { generator }
    }
}

impl QueryRestater for GenerativeRestater {
    fn restate(&self, question: &str, target: &EntityMatch, _others: &[EntityMatch]) -> Result<String, RagError> {
        let raw = self
            .generator
            .generate(RESTATEMENT_SYSTEM_PROMPT, &build_restatement_prompt(question, &target.name))?;

        raw.lines()
            .map(|line| line.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RagError::Decomposition("generator returned no restatement".into()))
    }
}
