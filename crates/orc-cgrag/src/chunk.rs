//! Splits a document into overlapping chunks, preferring to break on
//! paragraph boundaries (blank lines) rather than mid-paragraph when a
//! paragraph boundary falls within the target chunk size.

/// Approximate token count: whitespace-delimited word count. Good enough
/// for chunk-sizing purposes; actual tokenization is a provider detail.
pub fn approx_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

/// Chunk `text` into pieces of roughly `chunk_tokens` tokens, each
/// overlapping the previous by `overlap_tokens` tokens. Paragraph
/// boundaries (blank-line-separated) are preferred break points: a chunk
/// ends at the last paragraph boundary within its target window for window
/// sizes large enough to contain at least one whole paragraph, otherwise it
/// falls back to a hard word-count cut.
pub fn chunk_document(text: &str, chunk_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_tokens == 0 {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    // Map each paragraph's boundary to a cumulative word-offset, so we can
    // snap a hard cut back to the nearest preceding paragraph end.
    let mut paragraph_ends = Vec::with_capacity(paragraphs.len());
    let mut cursor = 0usize;
    for p in &paragraphs {
        cursor += approx_token_count(p);
        paragraph_ends.push(cursor);
    }

    let step = chunk_tokens.saturating_sub(overlap_tokens).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < words.len() {
        let hard_end = (start + chunk_tokens).min(words.len());
        let end = if hard_end < words.len() {
            paragraph_ends
                .iter()
                .copied()
                .filter(|&e| e > start && e <= hard_end)
                .max()
                .unwrap_or(hard_end)
        } else {
            hard_end
        };
        let end = end.max(start + 1);

        let chunk_text = words[start..end].join(" ");
        chunks.push(Chunk {
            index,
            token_count: end - start,
            text: chunk_text,
        });
        index += 1;

        if end >= words.len() {
            break;
        }
        start = if end > step { end - step.min(end) } else { end };
        start = start.max(end.saturating_sub(overlap_tokens));
        if start >= end {
            start = end;
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_document("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_document("one two three four five", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 5);
    }

    #[test]
    fn long_text_is_split_into_multiple_chunks() {
        let text = (0..500)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_document(&text, 100, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 100);
        }
    }

    #[test]
    fn prefers_paragraph_boundary_break() {
        let para_a = (0..40).map(|i| format!("a{i}")).collect::<Vec<_>>().join(" ");
        let para_b = (0..40).map(|i| format!("b{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("{para_a}\n\n{para_b}");
        let chunks = chunk_document(&text, 60, 5);
        assert_eq!(chunks[0].token_count, 40);
    }
}
