use std::str::FromStr;

use serde_json::{Map, Value};

use super::types::{Judgment, JudgmentOrigin};
use super::RagError;
use crate::models::{ComplianceAction, RiskLevel};

pub const PARSE_FAILURE_SUMMARY: &str =
    "Automated parsing of the model response failed. Manual review required.";

/// Which fallback tier produced a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The raw text was the JSON object.
    Direct,
    /// JSON after stripping code fences or a leading label.
    Unwrapped,
    /// JSON between the first `{` and the last `}`.
    Delimited,
    /// Nothing usable; MODERATE / FLAG.
    SafeDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJudgment {
    pub judgment: Judgment,
    pub strategy: ParseStrategy,
}

/// Parse generator output into a judgment. Never fails.
pub fn parse_judgment(entity: &str, raw: &str) -> Judgment {
    parse_with_strategy(entity, raw).judgment
}

pub fn parse_with_strategy(entity: &str, raw: &str) -> ParsedJudgment {
    let candidates = [
        (ParseStrategy::Direct, Some(raw.trim())),
        (ParseStrategy::Unwrapped, strip_wrappers(raw)),
        (ParseStrategy::Delimited, outermost_object(raw)),
    ];

    for (strategy, candidate) in candidates {
        let Some(text) = candidate else { continue };
        match interpret(entity, text) {
            Ok(judgment) => {
                tracing::debug!(entity, ?strategy, "Model response parsed");
                return ParsedJudgment { judgment, strategy };
            }
            Err(e) => tracing::debug!(entity, ?strategy, error = %e, "Parse strategy failed"),
        }
    }

    tracing::warn!(
        entity,
        response_len = raw.len(),
        "Model response unparseable, using safe default"
    );
    ParsedJudgment {
        judgment: Judgment::safe_default(entity, PARSE_FAILURE_SUMMARY, JudgmentOrigin::ParseFallback),
        strategy: ParseStrategy::SafeDefault,
    }
}

/// Remove code fences and a leading label such as `JSON:`.
fn strip_wrappers(raw: &str) -> Option<&str> {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (```json) up to the end of the first line.
        text = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }

    for label in ["json:", "response:", "answer:", "output:"] {
        if text.len() >= label.len()
            && text.is_char_boundary(label.len())
            && text[..label.len()].eq_ignore_ascii_case(label)
        {
            text = text[label.len()..].trim();
        }
    }

    (text != raw.trim()).then_some(text)
}

fn outermost_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Read a judgment from one candidate JSON text, leniently.
fn interpret(entity: &str, text: &str) -> Result<Judgment, RagError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RagError::ResponseParsing(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RagError::ResponseParsing("not a JSON object".into()))?;

    let risk = first_str(obj, &["risk_level", "risk", "riskLevel", "risk level", "severity"])
        .and_then(parse_risk);
    let action = first_str(obj, &["action", "recommended_action", "recommendation", "decision"])
        .and_then(parse_action);

    let (risk_level, action) = match (risk, action) {
        (Some(r), Some(a)) => (r, a),
        (Some(r), None) => (r, r.default_action()),
        (None, Some(a)) => (a.implied_risk(), a),
        (None, None) => {
            return Err(RagError::ResponseParsing(
                "neither risk level nor action present".into(),
            ))
        }
    };

    let summary = first_str(obj, &["summary", "violation_summary", "analysis", "reasoning", "explanation"])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary provided by the model.")
        .to_string();

    let citations = ["citations", "sources", "citation", "documents"]
        .iter()
        .find_map(|key| obj.get(*key))
        .map(citation_ids)
        .unwrap_or_default();

    Ok(Judgment {
        entity: entity.to_string(),
        risk_level,
        action,
        summary,
        citations,
        escalations: Vec::new(),
        origin: JudgmentOrigin::Model,
    })
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_str))
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

fn parse_risk(value: &str) -> Option<RiskLevel> {
    let upper = normalize(value);
    RiskLevel::from_str(&upper).ok().or(match upper.as_str() {
        "MEDIUM" => Some(RiskLevel::Moderate),
        "SEVERE" | "VERY_HIGH" => Some(RiskLevel::Critical),
        "NONE" | "MINIMAL" => Some(RiskLevel::Low),
        _ => None,
    })
}

fn parse_action(value: &str) -> Option<ComplianceAction> {
    let upper = normalize(value);
    ComplianceAction::from_str(&upper).ok().or(match upper.as_str() {
        "APPROVED" | "ALLOW" | "ALLOWED" | "PROCEED" => Some(ComplianceAction::Approve),
        "FLAGGED" | "REVIEW" | "ESCALATE" | "REQUIRES_REVIEW" => Some(ComplianceAction::Flag),
        "BLOCKED" | "DENY" | "DENIED" | "REJECT" | "PROHIBIT" => Some(ComplianceAction::Block),
        _ => None,
    })
}

/// Document ids from a citations field: strings, or objects carrying an id.
fn citation_ids(value: &Value) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => first_str(o, &["document_id", "doc", "id", "source"])
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"{"risk_level": "CRITICAL", "action": "BLOCK", "summary": "Karaoke is prohibited in APAC.", "citations": ["apac-doc"]}"#;

    #[test]
    fn direct_json_parses() {
        let parsed = parse_with_strategy("Japan", CLEAN);
        assert_eq!(parsed.strategy, ParseStrategy::Direct);
        let j = parsed.judgment;
        assert_eq!(j.entity, "Japan");
        assert_eq!(j.risk_level, RiskLevel::Critical);
        assert_eq!(j.action, ComplianceAction::Block);
        assert_eq!(j.citations, vec!["apac-doc".to_string()]);
        assert_eq!(j.origin, JudgmentOrigin::Model);
    }

    #[test]
    fn code_fenced_json_parses() {
        let raw = format!("```json\n{CLEAN}\n```");
        let parsed = parse_with_strategy("Japan", &raw);
        assert_eq!(parsed.strategy, ParseStrategy::Unwrapped);
        assert_eq!(parsed.judgment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn labelled_json_parses() {
        let parsed = parse_with_strategy("Japan", &format!("JSON: {CLEAN}"));
        assert_eq!(parsed.strategy, ParseStrategy::Unwrapped);
    }

    #[test]
    fn json_inside_prose_parses() {
        let raw = format!("Here is my assessment:\n{CLEAN}\nLet me know if you need more.");
        let parsed = parse_with_strategy("Japan", &raw);
        assert_eq!(parsed.strategy, ParseStrategy::Delimited);
        assert_eq!(parsed.judgment.action, ComplianceAction::Block);
    }

    #[test]
    fn garbage_falls_back_to_safe_default() {
        for raw in [
            "",
            "   ",
            "I cannot answer that.",
            "{\"risk_level\": \"CRIT",
            "}{",
            "[1, 2, 3]",
            "\u{0}\u{1}\u{fffd}binary\u{7f}",
            "{\"summary\": \"no verdict fields\"}",
            "```json\n```",
        ] {
            let parsed = parse_with_strategy("Germany", raw);
            assert_eq!(parsed.strategy, ParseStrategy::SafeDefault, "input: {raw:?}");
            let j = parsed.judgment;
            assert_eq!(j.risk_level, RiskLevel::Moderate);
            assert_eq!(j.action, ComplianceAction::Flag);
            assert_eq!(j.summary, PARSE_FAILURE_SUMMARY);
            assert_eq!(j.origin, JudgmentOrigin::ParseFallback);
        }
    }

    #[test]
    fn missing_action_is_derived_from_risk() {
        let j = parse_judgment("Japan", r#"{"risk_level": "low", "summary": "Fine."}"#);
        assert_eq!(j.risk_level, RiskLevel::Low);
        assert_eq!(j.action, ComplianceAction::Approve);
    }

    #[test]
    fn missing_risk_is_derived_from_action() {
        let j = parse_judgment("Japan", r#"{"decision": "blocked"}"#);
        assert_eq!(j.risk_level, RiskLevel::Critical);
        assert_eq!(j.action, ComplianceAction::Block);
        assert_eq!(j.summary, "No summary provided by the model.");
    }

    #[test]
    fn synonyms_are_accepted() {
        let j = parse_judgment("Japan", r#"{"risk": "Medium", "action": "requires review"}"#);
        assert_eq!(j.risk_level, RiskLevel::Moderate);
        assert_eq!(j.action, ComplianceAction::Flag);
    }

    #[test]
    fn unknown_risk_with_known_action_uses_action() {
        let j = parse_judgment("Japan", r#"{"risk_level": "spicy", "action": "APPROVE"}"#);
        assert_eq!(j.risk_level, RiskLevel::Low);
    }

    #[test]
    fn citation_objects_and_single_strings() {
        let j = parse_judgment(
            "Japan",
            r#"{"risk_level": "HIGH", "sources": [{"document_id": "a"}, "b", 7, ""]}"#,
        );
        assert_eq!(j.citations, vec!["a".to_string(), "b".to_string()]);

        let j = parse_judgment("Japan", r#"{"risk_level": "HIGH", "citations": "solo"}"#);
        assert_eq!(j.citations, vec!["solo".to_string()]);
    }

    #[test]
    fn non_ascii_label_prefix_does_not_panic() {
        let j = parse_judgment("Japan", "日本語の回答です");
        assert_eq!(j.origin, JudgmentOrigin::ParseFallback);
    }
}
