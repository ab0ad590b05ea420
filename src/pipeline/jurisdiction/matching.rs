//! Boundary-aware, ASCII case-insensitive phrase matching.
//!
//! ASCII lowercasing keeps byte offsets identical between the original and the
//! folded text, so match positions can be used to slice or rewrite the original.
//! Non-ASCII letters are compared as-is.

/// Byte offsets of every occurrence of `phrase` in `text` that is not glued to
/// a neighbouring letter or digit.
pub fn find_phrase(text: &str, phrase: &str) -> Vec<usize> {
    let needle = phrase.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let haystack = text.to_ascii_lowercase();

    let mut hits = Vec::new();
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(&needle) {
        let start = from + rel;
        let end = start + needle.len();
        if is_boundary_before(&haystack, start) && is_boundary_after(&haystack, end) {
            hits.push(start);
        }
        // Advance past the first char of this hit (not one byte) to stay on a char boundary.
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    hits
}

pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    !find_phrase(text, phrase).is_empty()
}

/// Replace every boundary-aware occurrence of `phrase` with `replacement`.
pub fn replace_phrase(text: &str, phrase: &str, replacement: &str) -> String {
    let hits = find_phrase(text, phrase);
    if hits.is_empty() {
        return text.to_string();
    }
    let len = phrase.trim().len();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for start in hits {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(replacement);
        cursor = start + len;
    }
    out.push_str(&text[cursor..]);
    out
}

fn is_boundary_before(text: &str, idx: usize) -> bool {
    text[..idx]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

fn is_boundary_after(text: &str, idx: usize) -> bool {
    text[idx..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric())
}
