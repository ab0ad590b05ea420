//! Prohibition-language escalation.
//!
//! A deterministic rule table (phrase set → minimum risk/action floor) applied
//! to a judgment using only the passages retrieved for that judgment's entity.
//! The transform only ever raises a judgment, and a second application changes
//! nothing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{read_json_file, ConfigError};
use crate::models::{ComplianceAction, RiskLevel};
use crate::pipeline::jurisdiction::matching::{contains_phrase, replace_phrase};
use crate::pipeline::rag::types::{Judgment, RetrievalResult};

pub const PROHIBITION_RULE_ID: &str = "PROHIBITION";

/// Phrases that raise a judgment to at least `min_risk` / `min_action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: String,
    pub phrases: Vec<String>,
    pub min_risk: RiskLevel,
    pub min_action: ComplianceAction,
}

/// The escalation vocabulary.
///
/// `negations` are phrases blanked out before rules are matched, so
/// "NOT Prohibited in: Europe" does not read as a prohibition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTable {
    pub rules: Vec<EscalationRule>,
    #[serde(default)]
    pub negations: Vec<String>,
}

/// A rule that matched, with the phrase that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit<'a> {
    pub rule: &'a EscalationRule,
    pub phrase: &'a str,
}

// ── Built-in vocabulary ─────────────────────────────────────

static PROHIBITION_PHRASES: &[&str] = &[
    "strictly prohibited",
    "strictly forbidden",
    "expressly prohibited",
    "explicitly prohibited",
    "prohibited",
    "forbidden",
    "not permitted",
    "is not allowed",
    "are not allowed",
    "banned",
];

static NEGATION_PHRASES: &[&str] = &[
    "not prohibited",
    "not strictly prohibited",
    "no longer prohibited",
    "not forbidden",
    "no longer forbidden",
    "not banned",
    "no longer banned",
];

impl EscalationTable {
    pub fn builtin() -> Self {
        Self {
            rules: vec![EscalationRule {
                id: PROHIBITION_RULE_ID.to_string(),
                phrases: PROHIBITION_PHRASES.iter().map(|p| p.to_string()).collect(),
                min_risk: RiskLevel::Critical,
                min_action: ComplianceAction::Block,
            }],
            negations: NEGATION_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let table = Self::from_json(&read_json_file(path)?)?;
        tracing::info!(
            path = %path.display(),
            rules = table.rules.len(),
            "Escalation table loaded"
        );
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::Invalid("escalation rule with empty id".into()));
            }
            if rule.phrases.iter().all(|p| p.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "escalation rule {} has no phrases",
                    rule.id
                )));
            }
        }
        Ok(())
    }

    /// Rules whose vocabulary appears in `text` (negated phrases excluded),
    /// each with the first of its phrases found.
    pub fn scan<'a>(&'a self, text: &str) -> Vec<RuleHit<'a>> {
        let cleaned = self
            .negations
            .iter()
            .fold(text.to_string(), |acc, negation| replace_phrase(&acc, negation, " "));

        self.rules
            .iter()
            .filter_map(|rule| {
                rule.phrases
                    .iter()
                    .find(|phrase| contains_phrase(&cleaned, phrase))
                    .map(|phrase| RuleHit {
                        rule,
                        phrase: phrase.as_str(),
                    })
            })
            .collect()
    }

    /// Raise `judgment` to the floor of every rule matched in the entity's own
    /// passages. Never lowers risk or action.
    pub fn escalate(&self, judgment: &Judgment, retrieval: &RetrievalResult) -> Judgment {
        let mut escalated = judgment.clone();

        for scored in &retrieval.passages {
            for hit in self.scan(&scored.passage.content) {
                let risk_level = escalated.risk_level.max(hit.rule.min_risk);
                let action = escalated.action.max(hit.rule.min_action);
                if risk_level == escalated.risk_level && action == escalated.action {
                    continue;
                }

                tracing::info!(
                    entity = %escalated.entity,
                    rule = %hit.rule.id,
                    phrase = hit.phrase,
                    document_id = %scored.passage.source_document_id,
                    from = %escalated.risk_level,
                    to = %risk_level,
                    "Judgment escalated"
                );

                escalated.risk_level = risk_level;
                escalated.action = action;
                if !escalated.escalations.contains(&hit.rule.id) {
                    escalated.escalations.push(hit.rule.id.clone());
                }
                if !escalated.citations.contains(&scored.passage.source_document_id) {
                    escalated
                        .citations
                        .push(scored.passage.source_document_id.clone());
                }
                escalated.summary = format!(
                    "{} [Escalated to {}/{}: policy text states \"{}\".]",
                    escalated.summary.trim_end(),
                    risk_level,
                    action,
                    hit.phrase
                );
            }
        }

        escalated
    }
}

impl Default for EscalationTable {
    fn default() -> Self {
        Self::builtin()
    }
}
