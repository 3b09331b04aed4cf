#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Characters treated as sentence boundaries, including the fullwidth CJK
/// forms since ingested documents are frequently bilingual.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', ';', '\n', '。', '！', '？', '；'];

/// A bounded span of source text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text
    pub content: String,
    /// Zero-based position of this chunk within its document
    pub chunk_index: usize,
    /// Length in characters (not bytes)
    pub char_count: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for text chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chunk_chars: usize,
    /// Whether a single sentence longer than the limit is force-split by
    /// character count instead of being emitted as an oversized chunk
    pub hard_split_oversized: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_chars: 512,
            hard_split_oversized: false,
        }
    }
}

/// Split raw text into embedding-ready chunks with per-chunk metadata.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let pieces = split_text(text, config.max_chunk_chars, config.hard_split_oversized);

    let chunks: Vec<TextChunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| {
            let char_count = content.chars().count();
            let token_count = estimate_token_count(&content);
            TextChunk {
                content,
                chunk_index,
                char_count,
                token_count,
            }
        })
        .collect();

    debug!(
        "Chunked {} chars into {} chunks (avg {} tokens)",
        text.chars().count(),
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split text on sentence boundaries and greedily pack consecutive
/// sentences into chunks of at most `max_chars` characters.
///
/// Text already within the limit is returned unchanged as a single element;
/// empty or whitespace-only input yields no chunks. A lone sentence longer
/// than the limit becomes its own oversized chunk unless
/// `hard_split_oversized` forces a character-level split. Output is a pure
/// function of the inputs.
#[inline]
pub fn split_text(text: &str, max_chars: usize, hard_split_oversized: bool) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // A zero limit would never terminate the hard split.
    let max_chars = max_chars.max(1);

    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();

        if sentence_chars > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if hard_split_oversized {
                chunks.extend(hard_split(&sentence, max_chars));
            } else {
                chunks.push(sentence);
            }
            continue;
        }

        // Sentences are joined with a single space, which counts against
        // the limit.
        let needed = if current.is_empty() {
            sentence_chars
        } else {
            current_chars + 1 + sentence_chars
        };

        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(&sentence);
            current_chars = sentence_chars;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
            current_chars = needed;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split text into trimmed sentences, keeping terminal punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if SENTENCE_TERMINATORS.contains(&ch) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Split an oversized sentence into pieces of at most `max_chars` characters.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
