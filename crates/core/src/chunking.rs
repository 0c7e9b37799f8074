use crate::models::{KnowledgeOptions, DEFAULT_MAX_CHUNK_CHARS};

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
const SENTENCE_JOINER: &str = ". ";

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

impl From<&KnowledgeOptions> for ChunkingConfig {
    fn from(value: &KnowledgeOptions) -> Self {
        Self {
            max_chars: value.max_chunk_chars,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence fragments between terminal punctuation, whitespace-normalized,
/// with empty fragments dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(SENTENCE_TERMINATORS)
        .map(normalize_whitespace)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Packs whole sentences into chunks of at most `config.max_chars` characters.
///
/// Sentences are never cut: one that is longer than the limit on its own
/// becomes a single oversized chunk.
pub fn chunk_by_sentence(text: &str, config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();

        if current.is_empty() {
            current.push_str(&sentence);
            current_len = sentence_len;
            continue;
        }

        if current_len + SENTENCE_JOINER.len() + sentence_len > config.max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(&sentence);
            current_len = sentence_len;
        } else {
            current.push_str(SENTENCE_JOINER);
            current.push_str(&sentence);
            current_len += SENTENCE_JOINER.len() + sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
