use serde::{Deserialize, Serialize};

use super::RagError;
use crate::models::*;

/// Entity name used when a question mentions no known entity.
pub const GENERAL_ENTITY: &str = "General";

/// One entity-scoped unit of a (possibly multi-entity) question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    /// `None` when no entity was detected.
    pub entity: Option<EntityMatch>,
    pub query_text: String,
    /// Always includes the universal tag.
    pub allowed_jurisdictions: JurisdictionSet,
}

impl SubQuery {
    /// Scoped to the entity's own jurisdictions plus universal policy.
    pub fn for_entity(entity: EntityMatch, query_text: impl Into<String>) -> Self {
        let allowed_jurisdictions = entity.jurisdictions.with_universal();
        Self {
            entity: Some(entity),
            query_text: query_text.into(),
            allowed_jurisdictions,
        }
    }

    /// The most conservative scope: universal policy only.
    pub fn universal(query_text: impl Into<String>) -> Self {
        Self {
            entity: None,
            query_text: query_text.into(),
            allowed_jurisdictions: JurisdictionSet::universal_only(),
        }
    }

    pub fn entity_name(&self) -> &str {
        self.entity.as_ref().map_or(GENERAL_ENTITY, |e| e.name.as_str())
    }
}

/// A passage with its similarity score (from vector search)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: PassageChunk,
    pub score: f32,
}

/// How a sub-query's retrieval ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Complete,
    /// Backend error; passages are empty.
    Failed,
    /// Request deadline passed first; passages are empty.
    TimedOut,
}

/// Scope-filtered passages for one sub-query, in similarity order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub sub_query: SubQuery,
    pub passages: Vec<ScoredPassage>,
    /// Whether the widened search ran.
    pub widened: bool,
    pub status: RetrievalStatus,
}

impl RetrievalResult {
    pub fn empty(sub_query: SubQuery, status: RetrievalStatus) -> Self {
        Self {
            sub_query,
            passages: Vec::new(),
            widened: false,
            status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Distinct source documents, in rank order of their best passage.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for scored in &self.passages {
            if !ids.contains(&scored.passage.source_document_id) {
                ids.push(scored.passage.source_document_id.clone());
            }
        }
        ids
    }

    pub fn cites(&self, document_id: &str) -> bool {
        self.passages
            .iter()
            .any(|p| p.passage.source_document_id == document_id)
    }
}

/// Where a judgment's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentOrigin {
    /// Parsed from generator output.
    Model,
    /// Generator output could not be parsed.
    ParseFallback,
    /// Retrieval found nothing in scope; generator not called.
    NoPolicy,
    /// No judgment before the request deadline.
    Unavailable,
    /// Generator errored or timed out.
    GeneratorFailure,
    /// Retrieval backend errored; generator not called.
    RetrievalFailure,
}

/// Structured risk judgment for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub entity: String,
    pub risk_level: RiskLevel,
    pub action: ComplianceAction,
    pub summary: String,
    /// Source document ids.
    pub citations: Vec<String>,
    /// Ids of escalation rules that raised this judgment.
    #[serde(default)]
    pub escalations: Vec<String>,
    pub origin: JudgmentOrigin,
}

impl Judgment {
    /// MODERATE / FLAG: the conservative answer whenever the model's can't be used.
    pub fn safe_default(
        entity: impl Into<String>,
        summary: impl Into<String>,
        origin: JudgmentOrigin,
    ) -> Self {
        Self {
            entity: entity.into(),
            risk_level: RiskLevel::Moderate,
            action: ComplianceAction::Flag,
            summary: summary.into(),
            citations: Vec::new(),
            escalations: Vec::new(),
            origin,
        }
    }

    pub fn no_policy(entity: &str) -> Self {
        Self::safe_default(
            entity,
            format!("No applicable policy found for {entity}. Manual review required."),
            JudgmentOrigin::NoPolicy,
        )
    }

    pub fn unavailable(entity: &str, reason: &str) -> Self {
        Self::safe_default(
            entity,
            format!("Assessment unavailable for {entity}: {reason}. Manual review required."),
            JudgmentOrigin::Unavailable,
        )
    }

    /// Whether the content is a degraded stand-in rather than a model answer.
    pub fn is_degraded(&self) -> bool {
        self.origin != JudgmentOrigin::Model
    }
}

/// A contained failure, reported alongside the answer instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub entity: String,
    pub stage: DiagnosticStage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(entity: impl Into<String>, stage: DiagnosticStage, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            stage,
            message: message.into(),
        }
    }
}

/// Nearest-neighbor primitive over tagged passages.
pub trait VectorSearch: Send + Sync {
    /// Top `top_k` passages by descending similarity.
    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, RagError>;
}

/// Text generation primitive. May be slow and may return malformed output.
pub trait LlmGenerate: Send + Sync {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, RagError>;
}
