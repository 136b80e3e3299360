//! Sentence-boundary text chunker.
//!
//! Splits normalized text into [`Chunk`]s of at most `max_chunk_chars`
//! characters, accumulating whole sentences greedily. The sentence split is
//! an intentionally approximate heuristic (terminal `.`/`!`/`?` followed by
//! whitespace), not a full NLP splitter; the token estimate is likewise the
//! fixed `ceil(chars / 4)` approximation, never exact.
//!
//! Chunk indices are assigned in text order and are stable across re-runs
//! on identical input, which is what makes upsert-by-composite-id
//! idempotence meaningful. Changing either heuristic changes chunk
//! boundaries and therefore vector ids.

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Default character budget per chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;

/// Approximate token count for a span of text.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

/// Split text into sentences ending with `.`, `!`, or `?` followed by
/// whitespace (or end of input). A terminator followed by a non-space
/// character, as in "3.14", does not end a sentence. Input with no
/// terminated sentence at all yields an empty list; the caller must treat
/// that as nothing to ingest.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            // Absorb a run of terminators ("?!", "...").
            let mut end = i + 1;
            while end < bytes.len() && matches!(bytes[end], b'.' | b'!' | b'?') {
                end += 1;
            }
            if end == bytes.len() || bytes[end].is_ascii_whitespace() {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
            i = end;
        } else {
            i += 1;
        }
    }
    sentences
}

/// Greedily pack consecutive sentences into chunks of at most
/// `max_chunk_chars` characters. A single sentence longer than the budget
/// becomes its own oversized chunk; that is the one accepted exception to
/// the length bound.
pub fn chunk_text(text: &str, max_chunk_chars: usize) -> Vec<Chunk> {
    let sentences = split_sentences(text);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buf = String::new();
    // The budget counts chars, not bytes, matching the token estimate
    // and the snippet cap.
    let mut buf_chars = 0usize;

    for sentence in sentences {
        let sentence_chars = sentence.chars().count();
        let would_be = if buf.is_empty() {
            sentence_chars
        } else {
            buf_chars + 1 + sentence_chars // +1 for the joining space
        };

        if would_be > max_chunk_chars && !buf.is_empty() {
            push_chunk(&mut chunks, &buf);
            buf.clear();
            buf_chars = 0;
        }

        if !buf.is_empty() {
            buf.push(' ');
            buf_chars += 1;
        }
        buf.push_str(sentence);
        buf_chars += sentence_chars;
    }

    if !buf.is_empty() {
        push_chunk(&mut chunks, &buf);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str) {
    chunks.push(Chunk {
        index: chunks.len(),
        text: text.to_string(),
        token_estimate: estimate_tokens(text),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", DEFAULT_MAX_CHUNK_CHARS);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn no_terminal_punctuation_yields_no_chunks() {
        let chunks = chunk_text("just a fragment with no ending", DEFAULT_MAX_CHUNK_CHARS);
        assert!(chunks.is_empty());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", DEFAULT_MAX_CHUNK_CHARS).is_empty());
    }

    #[test]
    fn decimal_point_does_not_split() {
        let sentences = split_sentences("The value of pi is 3.14 roughly. Next sentence.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "The value of pi is 3.14 roughly.");
    }

    #[test]
    fn terminator_runs_stay_together() {
        let sentences = split_sentences("Really?! Yes... Fine.");
        assert_eq!(sentences, vec!["Really?!", "Yes...", "Fine."]);
    }

    #[test]
    fn chunks_respect_length_bound() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} has a bit of padding text in it.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 500);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 500, "chunk too long: {}", chunk.text.len());
        }
    }

    #[test]
    fn budget_counts_chars_not_bytes() {
        // Two 240-char sentences of 2-byte chars: 481 chars joined, well
        // under the budget even though the byte length is far over it.
        let sentence = format!("{}.", "é".repeat(239));
        let text = format!("{} {}", sentence, sentence);
        let chunks = chunk_text(&text, 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text.chars().count(), 481);
        assert!(chunks[0].text.len() > 500);
    }

    #[test]
    fn single_oversized_sentence_is_accepted_as_one_chunk() {
        let long = format!("{}.", "x".repeat(700));
        let chunks = chunk_text(&long, 500);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.len() > 500);
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let text = (0..30)
            .map(|i| format!("This is sentence {} of the test corpus.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 120);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Alpha is first. Beta follows. Gamma is third! Delta ends?";
        let a = chunk_text(text, 40);
        let b = chunk_text(text, 40);
        assert_eq!(a, b);
    }

    #[test]
    fn token_estimate_is_ceil_of_quarter_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(500)), 125);
    }
}
