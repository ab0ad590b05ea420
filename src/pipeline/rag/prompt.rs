use super::types::{RetrievalResult, SubQuery};
use crate::pipeline::safety::neutralize_delimiters;

pub const RISK_OFFICER_SYSTEM_PROMPT: &str = r#"You are a Risk Officer specializing in corporate compliance analysis. You assess ONE jurisdiction at a time.

ABSOLUTE RULES, NO EXCEPTIONS:
1. Answer ONLY from the policy excerpts supplied in the prompt. Each excerpt is wrapped in <POLICY_EXCERPT> tags with its document id and declared scope.
2. NEVER infer that a policy applies to a jurisdiction unless its scope or text explicitly says so.
3. NEVER use knowledge about other jurisdictions, other questions, or policies not shown.
4. Be strict and conservative: if a supplied excerpt explicitly prohibits the activity, the risk is CRITICAL and the action is BLOCK.
5. If the excerpts do not address the activity, say so and choose MODERATE / FLAG.
6. Cite the document id of every excerpt you rely on.

OUTPUT FORMAT:
Respond with a single JSON object and nothing else:
{"risk_level": "LOW" | "MODERATE" | "HIGH" | "CRITICAL",
 "action": "APPROVE" | "FLAG" | "BLOCK",
 "summary": "<two or three sentences citing the relevant sections>",
 "citations": ["<document id>", ...]}"#;

pub const RESTATEMENT_SYSTEM_PROMPT: &str = r#"You rewrite a multi-part compliance question into a focused question about exactly one jurisdiction.

RULES:
1. Keep the activity, amounts, and circumstances that concern the target jurisdiction.
2. Mention the target jurisdiction by name.
3. NEVER mention any other jurisdiction, region, or country.
4. Output the rewritten question only, on one line, without quotes or commentary."#;

/// Build the isolated judgment prompt for one entity.
///
/// Only passages from this entity's own retrieval are included, in rank
/// order, up to `max_context_chars`.
pub fn build_entity_prompt(
    sub_query: &SubQuery,
    retrieval: &RetrievalResult,
    max_context_chars: usize,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "JURISDICTION UNDER REVIEW: {}\nSCOPES IN FORCE: {}\n\n",
        sub_query.entity_name(),
        sub_query.allowed_jurisdictions
    ));

    let mut used = 0usize;
    for (i, scored) in retrieval.passages.iter().enumerate() {
        let passage = &scored.passage;
        let remaining = max_context_chars.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        // Policy text must not be able to close its own excerpt block.
        let text = neutralize_delimiters(&passage.content);
        // The top passage is always included, cut to the budget if needed.
        let content = if text.len() <= remaining {
            text.as_str()
        } else if i == 0 {
            truncate_to(&text, remaining)
        } else {
            break;
        };
        used += content.len();

        prompt.push_str(&format!(
            "<POLICY_EXCERPT doc=\"{}\" scope=\"{}\">\n{}\n</POLICY_EXCERPT>\n\n",
            passage.source_document_id, passage.jurisdictions, content
        ));
    }

    prompt.push_str(&format!(
        "<QUESTION>\n{}\n</QUESTION>\n\n",
        sub_query.query_text
    ));
    prompt.push_str(&format!(
        "Assess ONLY {} using ONLY the excerpts above. Respond with the JSON object.",
        sub_query.entity_name()
    ));

    prompt
}

/// Prompt asking the generator to restate `question` for one entity.
pub fn build_restatement_prompt(question: &str, entity_name: &str) -> String {
    format!(
        "TARGET JURISDICTION: {entity_name}\n\n<QUESTION>\n{question}\n</QUESTION>\n\n\
         Rewrite the question so it asks only about {entity_name}."
    )
}

fn truncate_to(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
