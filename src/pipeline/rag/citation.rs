use std::sync::LazyLock;

use regex::Regex;

use super::types::RetrievalResult;

static INLINE_DOC: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\[doc(?:ument)?(?:\s+id)?:\s*([A-Za-z0-9][A-Za-z0-9_.:-]*)[^\]]*\]").ok()
});

/// `[Doc: <id>]` references written inline in model prose.
pub fn extract_inline_citations(text: &str) -> Vec<String> {
    let Some(re) = INLINE_DOC.as_ref() else {
        return Vec::new();
    };
    let mut ids: Vec<String> = Vec::new();
    for cap in re.captures_iter(text) {
        if let Some(id) = cap.get(1).map(|m| m.as_str().to_string()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Keep only citations naming a document in this entity's own passages.
///
/// When nothing valid remains, cite the entity's passage documents in rank
/// order instead, so a judgment backed by passages is never uncited.
pub fn validate_citations(entity: &str, cited: Vec<String>, retrieval: &RetrievalResult) -> Vec<String> {
    let mut valid: Vec<String> = Vec::new();
    for id in cited {
        if !retrieval.cites(&id) {
            tracing::warn!(
                entity,
                document_id = %id,
                "Citation references a document outside this entity's context, removed"
            );
            continue;
        }
        if !valid.contains(&id) {
            valid.push(id);
        }
    }

    if valid.is_empty() {
        return retrieval.document_ids();
    }
    valid
}
