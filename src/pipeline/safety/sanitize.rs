use std::sync::LazyLock;

use regex::Regex;

use super::types::{InputModification, InputModificationKind, SafetyError, SanitizedInput};

/// Sanitize a compliance question before entity detection and prompt building.
///
/// Fails only when nothing usable is left.
pub fn sanitize_question(raw_question: &str, max_length: usize) -> Result<SanitizedInput, SafetyError> {
    let mut text = raw_question.to_string();
    let mut modifications = Vec::new();

    // Step 1: Remove non-visible Unicode characters
    let before = text.clone();
    text = remove_invisible_unicode(&text);
    if text != before {
        modifications.push(InputModification {
            kind: InputModificationKind::InvisibleUnicodeRemoved,
            description: "Stripped non-visible Unicode characters".to_string(),
        });
    }

    // Step 2: Remove control characters (except newline, tab)
    let before = text.clone();
    text = remove_control_characters(&text);
    if text != before {
        modifications.push(InputModification {
            kind: InputModificationKind::ControlCharacterRemoved,
            description: "Stripped control characters".to_string(),
        });
    }

    // Step 3: Neutralize prompt injection patterns
    let before = text.clone();
    text = remove_injection_patterns(&text);
    if text != before {
        modifications.push(InputModification {
            kind: InputModificationKind::InjectionPatternRemoved,
            description: "Removed potential prompt injection patterns".to_string(),
        });
    }

    // Step 4: Truncate to maximum length
    if text.len() > max_length {
        let original_len = text.len();
        text = truncate_at_word_boundary(&text, max_length);
        modifications.push(InputModification {
            kind: InputModificationKind::ExcessiveLengthTruncated,
            description: format!("Truncated from {} to {} characters", original_len, text.len()),
        });
    }

    let text = text.trim().to_string();
    if text.is_empty() || text == "[FILTERED]" {
        return Err(SafetyError::EmptyInput);
    }

    if !modifications.is_empty() {
        tracing::debug!(modifications = modifications.len(), "Question sanitized");
    }

    Ok(SanitizedInput {
        text,
        was_modified: !modifications.is_empty(),
        modifications,
    })
}

fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{2069}'
                | '\u{FEFF}'
                | '\u{00AD}'
                | '\u{034F}'
                | '\u{061C}'
                | '\u{180E}'
            )
        })
        .collect()
}

fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Replace known prompt injection patterns with `[FILTERED]`.
fn remove_injection_patterns(text: &str) -> String {
    static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            // Role override attempts
            r"(?i)ignore\s+(?:previous|above|all\s+prior|the\s+above|all)\s+(?:instructions?|rules?|prompts?|policies)",
            r"(?i)disregard\s+(?:the\s+)?(?:policy|policies|context|instructions?)",
            r"(?i)new\s+instructions?:",
            r"(?i)you\s+are\s+now\s+(?:a|an)\s+",
            // Forced verdicts
            r"(?i)(?:respond|answer|reply)\s+(?:only\s+)?with\s+(?:risk\s+level\s+)?(?:low|approve|compliant)\b",
            r"(?i)(?:always|must)\s+(?:approve|return\s+low)\b",
            // System/role tags
            r"(?i)system\s*:",
            r"(?i)assistant\s*:",
            r"<<SYS>>",
            r"\[INST\]",
            r"<\|im_start\|>",
            r"<\|im_end\|>",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    let mut result = neutralize_delimiters(text);
    for pattern in INJECTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[FILTERED]").to_string();
    }
    result
}

/// Replace the tags that frame entity prompts with `[FILTERED]`.
///
/// Applied to questions and to policy text alike, so neither can close an
/// excerpt block or open a question block of its own.
pub fn neutralize_delimiters(text: &str) -> String {
    static DELIMITERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
        Regex::new(r"(?i)</?\s*(?:POLICY_EXCERPT|QUESTION)\b[^>]*>").ok()
    });

    match DELIMITERS.as_ref() {
        Some(re) => re.replace_all(text, "[FILTERED]").into_owned(),
        None => text.to_string(),
    }
}

/// Truncate at a word boundary at or before `max` bytes.
fn truncate_at_word_boundary(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated.to_string(),
    }
}
