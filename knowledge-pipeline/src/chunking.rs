//! Sentence-respecting chunker for lesson text.

pub const DEFAULT_MAX_CHARS: usize = 800;

const SENTENCE_BREAK: &str = ". ";

/// Splits `text` into chunks of at most `max_chars` characters without breaking sentences.
///
/// Sentences are separated on a period followed by a space and accumulated greedily. A
/// chunk only exceeds `max_chars` when it holds a single sentence that is longer on its
/// own. Joining the chunks with a single space reproduces the sentence sequence.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let pieces: Vec<&str> = text.split(SENTENCE_BREAK).collect();
    let last_piece = pieces.len().saturating_sub(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for (position, piece) in pieces.iter().enumerate() {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Only the final piece keeps whatever terminator it already had.
        let sentence = if position < last_piece {
            format!("{trimmed}.")
        } else {
            trimmed.to_string()
        };
        let sentence_chars = sentence.chars().count();

        if current.is_empty() {
            current = sentence;
            current_chars = sentence_chars;
            continue;
        }

        let candidate_chars = current_chars
            .saturating_add(1)
            .saturating_add(sentence_chars);
        if candidate_chars > max_chars {
            chunks.push(std::mem::replace(&mut current, sentence));
            current_chars = sentence_chars;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_chars = candidate_chars;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
