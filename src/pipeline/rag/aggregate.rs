use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{Diagnostic, Judgment, SubQuery};
use crate::models::{ComplianceAction, ComplianceStatus, JurisdictionSet, RiskLevel};

/// Final answer to one question: per-entity judgments in detection order.
///
/// The overall risk is computed from `per_entity` on every call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateAnswer {
    pub request_id: Uuid,
    pub question: String,
    pub per_entity: Vec<Judgment>,
    pub sub_queries: Vec<SubQuery>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Combine finalized judgments into an answer.
pub fn aggregate(
    request_id: Uuid,
    question: &str,
    sub_queries: Vec<SubQuery>,
    per_entity: Vec<Judgment>,
    diagnostics: Vec<Diagnostic>,
) -> AggregateAnswer {
    AggregateAnswer {
        request_id,
        question: question.to_string(),
        per_entity,
        sub_queries,
        diagnostics,
    }
}

impl AggregateAnswer {
    /// Most severe per-entity level; MODERATE when there is no judgment at all.
    pub fn overall_risk_level(&self) -> RiskLevel {
        self.per_entity
            .iter()
            .map(|j| j.risk_level)
            .max()
            .unwrap_or(RiskLevel::Moderate)
    }

    pub fn overall_action(&self) -> ComplianceAction {
        self.per_entity
            .iter()
            .map(|j| j.action)
            .max()
            .unwrap_or(ComplianceAction::Flag)
    }

    pub fn status(&self) -> ComplianceStatus {
        ComplianceStatus::from_risk(self.overall_risk_level())
    }

    pub fn judgment(&self, entity: &str) -> Option<&Judgment> {
        self.per_entity
            .iter()
            .find(|j| j.entity.eq_ignore_ascii_case(entity))
    }

    /// Names of the detected entities that were assessed.
    pub fn regions_analyzed(&self) -> Vec<String> {
        self.sub_queries
            .iter()
            .filter_map(|sq| sq.entity.as_ref().map(|e| e.name.clone()))
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty() || self.per_entity.iter().any(Judgment::is_degraded)
    }

    pub fn report(&self) -> ComplianceReport {
        ComplianceReport {
            request_id: self.request_id,
            question: self.question.clone(),
            overall_risk_level: self.overall_risk_level(),
            overall_action: self.overall_action(),
            compliance_status: self.status(),
            per_entity: self.per_entity.clone(),
            query_decomposition: self
                .sub_queries
                .iter()
                .map(|sq| DecompositionEntry {
                    entity: sq.entity_name().to_string(),
                    query_text: sq.query_text.clone(),
                    allowed_jurisdictions: sq.allowed_jurisdictions.clone(),
                })
                .collect(),
            regions_analyzed: self.regions_analyzed(),
            diagnostics: self.diagnostics.clone(),
            user_friendly_output: self.render(),
            generated_at: Utc::now(),
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("COMPLIANCE ASSESSMENT\n");
        out.push_str(&format!("Question: {}\n", self.question));
        out.push_str(&format!(
            "Overall: {} risk, {} ({})\n",
            self.overall_risk_level(),
            self.overall_action(),
            self.status()
        ));

        for judgment in &self.per_entity {
            out.push('\n');
            out.push_str(&format!(
                "{}: {} / {}\n",
                judgment.entity.to_uppercase(),
                judgment.risk_level,
                judgment.action
            ));
            out.push_str(judgment.summary.trim());
            out.push('\n');
            if !judgment.citations.is_empty() {
                out.push_str(&format!("Sources: {}\n", judgment.citations.join(", ")));
            }
        }

        if !self.diagnostics.is_empty() {
            out.push_str("\nNOTES\n");
            for d in &self.diagnostics {
                out.push_str(&format!("- [{}] {}: {}\n", d.stage, d.entity, d.message));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionEntry {
    pub entity: String,
    pub query_text: String,
    pub allowed_jurisdictions: JurisdictionSet,
}

/// Serializable view of an answer for an outer layer to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub request_id: Uuid,
    pub question: String,
    pub overall_risk_level: RiskLevel,
    pub overall_action: ComplianceAction,
    pub compliance_status: ComplianceStatus,
    pub per_entity: Vec<Judgment>,
    pub query_decomposition: Vec<DecompositionEntry>,
    pub regions_analyzed: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub user_friendly_output: String,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiagnosticStage, EntityMatch};
    use crate::pipeline::rag::types::JudgmentOrigin;

    fn judgment(entity: &str, risk_level: RiskLevel, action: ComplianceAction) -> Judgment {
        Judgment {
            entity: entity.into(),
            risk_level,
            action,
            summary: format!("{entity} summary."),
            citations: vec![format!("{}-doc", entity.to_lowercase())],
            escalations: vec![],
            origin: JudgmentOrigin::Model,
        }
    }

    fn sub_query(name: &str) -> SubQuery {
        SubQuery::for_entity(
            EntityMatch {
                name: name.into(),
                aliases_matched: name.to_lowercase(),
                jurisdictions: [name].into_iter().collect(),
            },
            format!("K in {name}?"),
        )
    }

    fn answer(judgments: Vec<Judgment>) -> AggregateAnswer {
        let sub_queries = judgments.iter().map(|j| sub_query(&j.entity)).collect();
        aggregate(Uuid::nil(), "K in J1 and J2?", sub_queries, judgments, vec![])
    }

    #[test]
    fn overall_is_maximum_severity() {
        let levels = [RiskLevel::Low, RiskLevel::Moderate, RiskLevel::High, RiskLevel::Critical];
        for a in levels {
            for b in levels {
                let ans = answer(vec![
                    judgment("J1", a, a.default_action()),
                    judgment("J2", b, b.default_action()),
                ]);
                assert_eq!(ans.overall_risk_level(), a.max(b));
            }
        }
    }

    #[test]
    fn empty_answer_is_moderate_review() {
        let ans = answer(vec![]);
        assert_eq!(ans.overall_risk_level(), RiskLevel::Moderate);
        assert_eq!(ans.status(), ComplianceStatus::RequiresReview);
    }

    #[test]
    fn overall_recomputes_after_judgment_changes() {
        let mut ans = answer(vec![judgment("J1", RiskLevel::Low, ComplianceAction::Approve)]);
        assert_eq!(ans.overall_risk_level(), RiskLevel::Low);
        ans.per_entity[0].risk_level = RiskLevel::High;
        assert_eq!(ans.overall_risk_level(), RiskLevel::High);
    }

    #[test]
    fn judgment_lookup_by_entity() {
        let ans = answer(vec![
            judgment("J1", RiskLevel::Low, ComplianceAction::Approve),
            judgment("J2", RiskLevel::Critical, ComplianceAction::Block),
        ]);
        assert_eq!(ans.judgment("j2").unwrap().action, ComplianceAction::Block);
        assert!(ans.judgment("J3").is_none());
    }

    #[test]
    fn report_carries_decomposition_and_sections() {
        let mut ans = answer(vec![
            judgment("J1", RiskLevel::Low, ComplianceAction::Approve),
            judgment("J2", RiskLevel::Critical, ComplianceAction::Block),
        ]);
        ans.diagnostics.push(Diagnostic::new("J2", DiagnosticStage::Decompose, "fallback used"));
        let report = ans.report();

        assert_eq!(report.compliance_status, ComplianceStatus::RiskDetected);
        assert_eq!(report.overall_action, ComplianceAction::Block);
        assert_eq!(report.regions_analyzed, vec!["J1".to_string(), "J2".to_string()]);
        assert_eq!(report.query_decomposition.len(), 2);
        assert_eq!(report.query_decomposition[1].query_text, "K in J2?");
        assert!(report.user_friendly_output.contains("J1: LOW / APPROVE"));
        assert!(report.user_friendly_output.contains("J2: CRITICAL / BLOCK"));
        assert!(report.user_friendly_output.contains("Sources: j2-doc"));
        assert!(report.user_friendly_output.contains("- [decompose] J2: fallback used"));
    }

    #[test]
    fn report_serializes() {
        let report = answer(vec![judgment("J1", RiskLevel::Low, ComplianceAction::Approve)]).report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overall_risk_level"], "LOW");
        assert_eq!(json["compliance_status"], "COMPLIANT");
        assert_eq!(json["query_decomposition"][0]["allowed_jurisdictions"][0], "GLOBAL");
        assert!(json["user_friendly_output"].as_str().unwrap().contains("J1"));
    }

    #[test]
    fn general_question_has_no_regions() {
        let ans = aggregate(
            Uuid::nil(),
            "Any gift rules?",
            vec![SubQuery::universal("Any gift rules?")],
            vec![judgment("General", RiskLevel::Low, ComplianceAction::Approve)],
            vec![],
        );
        assert!(ans.regions_analyzed().is_empty());
        assert!(!ans.is_degraded());
    }
}
