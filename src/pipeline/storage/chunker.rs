use super::types::{Chunker, TextChunk};

/// Separators tried in order: paragraph, line, sentence, word.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Recursive character chunker for policy documents.
/// Splits on the coarsest separator that fits, then packs pieces into
/// chunks with a trailing overlap so a clause cut at a boundary survives intact
/// in at least one chunk.
pub struct PolicyChunker {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    overlap_chars: usize,
}

impl PolicyChunker {
    pub fn new() -> Self {
        Self {
            max_chunk_chars: 1000,
            min_chunk_chars: 20,
            overlap_chars: 200,
        }
    }

    pub fn with_limits(max_chunk_chars: usize, overlap_chars: usize) -> Self {
        let max_chunk_chars = max_chunk_chars.max(1);
        Self {
            max_chunk_chars,
            min_chunk_chars: 20.min(max_chunk_chars),
            overlap_chars: overlap_chars.min(max_chunk_chars / 2),
        }
    }
}

impl Default for PolicyChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for PolicyChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let pieces = atomize(text, SEPARATORS, self.max_chunk_chars);

        let mut contents: Vec<String> = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if !current.is_empty() && current.len() + piece.len() > self.max_chunk_chars {
                push_trimmed(&mut contents, &current);
                current = overlap_tail(&current, self.overlap_chars).to_string();
                if current.len() + piece.len() > self.max_chunk_chars {
                    current.clear();
                }
            }
            current.push_str(piece);
        }
        push_trimmed(&mut contents, &current);

        merge_tiny_chunks(&mut contents, self.min_chunk_chars);

        contents
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| TextChunk {
                content,
                chunk_index,
            })
            .collect()
    }
}

/// Break `text` into pieces no longer than `max` whose concatenation is `text`.
fn atomize<'a>(text: &'a str, separators: &[&str], max: usize) -> Vec<&'a str> {
    if text.len() <= max {
        return vec![text];
    }
    match separators.split_first() {
        Some((sep, rest)) => text
            .split_inclusive(sep)
            .flat_map(|piece| atomize(piece, rest, max))
            .collect(),
        None => hard_split(text, max),
    }
}

/// Last resort for separator-free runs: cut at char boundaries.
fn hard_split(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // max smaller than one char: take the whole char
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}

/// Up to `overlap` trailing bytes of `text`, starting on a word boundary.
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 || text.is_empty() {
        return "";
    }
    if text.len() <= overlap {
        return text;
    }
    let mut start = text.len() - overlap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start(),
        None => tail,
    }
}

fn push_trimmed(contents: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        contents.push(trimmed.to_string());
    }
}

/// Fold chunks shorter than `min_chars` into their predecessor.
fn merge_tiny_chunks(contents: &mut Vec<String>, min_chars: usize) {
    let mut merged: Vec<String> = Vec::with_capacity(contents.len());
    for chunk in contents.drain(..) {
        match merged.last_mut() {
            Some(prev) if chunk.len() < min_chars => {
                prev.push('\n');
                prev.push_str(&chunk);
            }
            _ => merged.push(chunk),
        }
    }
    *contents = merged;
}
