//! Token counting and token-based truncation.

use std::path::Path;

use tokenizers::Tokenizer;
use tracing::warn;

use super::GeneratorError;

/// Rough byte-to-token ratio for English text.
const BYTES_PER_TOKEN: usize = 4;

/// Counts tokens and cuts text at token boundaries.
pub trait TokenCounter: Send + Sync {
    /// Returns the number of tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Keeps at most the first `max_tokens` tokens of `text`.
    fn truncate_head(&self, text: &str, max_tokens: usize) -> String;

    /// Keeps at most the last `max_tokens` tokens of `text`.
    fn truncate_tail(&self, text: &str, max_tokens: usize) -> String;
}

/// Estimates tokens from byte length, ~4 bytes per token.
///
/// Never splits a UTF-8 character.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(BYTES_PER_TOKEN)
    }

    fn truncate_head(&self, text: &str, max_tokens: usize) -> String {
        let max_bytes = max_tokens.saturating_mul(BYTES_PER_TOKEN);
        if text.len() <= max_bytes {
            return text.to_string();
        }

        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }

    fn truncate_tail(&self, text: &str, max_tokens: usize) -> String {
        let max_bytes = max_tokens.saturating_mul(BYTES_PER_TOKEN);
        if text.len() <= max_bytes {
            return text.to_string();
        }

        let mut start = text.len() - max_bytes;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        text[start..].to_string()
    }
}

/// Exact token counts from a Hugging Face `tokenizer.json` (e.g. GPT-2's).
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    /// Loads a tokenizer definition from disk.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Tokenizer` if the file is missing or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GeneratorError> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            GeneratorError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
        })?;
        Ok(Self { tokenizer })
    }

    fn ids(&self, text: &str) -> Option<Vec<u32>> {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => Some(encoding.get_ids().to_vec()),
            Err(e) => {
                warn!(error = %e, "tokenizer failed to encode text, falling back to estimate");
                None
            }
        }
    }

    fn decode(&self, ids: &[u32]) -> Option<String> {
        match self.tokenizer.decode(ids, true) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "tokenizer failed to decode ids, falling back to estimate");
                None
            }
        }
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.ids(text) {
            Some(ids) => ids.len(),
            None => HeuristicTokenCounter.count(text),
        }
    }

    fn truncate_head(&self, text: &str, max_tokens: usize) -> String {
        let Some(ids) = self.ids(text) else {
            return HeuristicTokenCounter.truncate_head(text, max_tokens);
        };
        if ids.len() <= max_tokens {
            return text.to_string();
        }

        self.decode(&ids[..max_tokens])
            .unwrap_or_else(|| HeuristicTokenCounter.truncate_head(text, max_tokens))
    }

    fn truncate_tail(&self, text: &str, max_tokens: usize) -> String {
        let Some(ids) = self.ids(text) else {
            return HeuristicTokenCounter.truncate_tail(text, max_tokens);
        };
        if ids.len() <= max_tokens {
            return text.to_string();
        }

        self.decode(&ids[ids.len() - max_tokens..])
            .unwrap_or_else(|| HeuristicTokenCounter.truncate_tail(text, max_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_count_rounds_up() {
        assert_eq!(HeuristicTokenCounter.count(""), 0);
        assert_eq!(HeuristicTokenCounter.count("abc"), 1);
        assert_eq!(HeuristicTokenCounter.count("abcd"), 1);
        assert_eq!(HeuristicTokenCounter.count("abcde"), 2);
    }

    #[test]
    fn heuristic_truncate_head_keeps_prefix() {
        let text = "abcdefghijkl";
        assert_eq!(HeuristicTokenCounter.truncate_head(text, 2), "abcdefgh");
        assert_eq!(HeuristicTokenCounter.truncate_head(text, 10), text);
    }

    #[test]
    fn heuristic_truncate_tail_keeps_suffix() {
        let text = "abcdefghijkl";
        assert_eq!(HeuristicTokenCounter.truncate_tail(text, 2), "efghijkl");
        assert_eq!(HeuristicTokenCounter.truncate_tail(text, 0), "");
    }

    #[test]
    fn heuristic_truncation_respects_char_boundaries() {
        // Each 'é' is two bytes, so a 4-byte cut can land mid-character.
        let text = "aéééé";
        let head = HeuristicTokenCounter.truncate_head(text, 1);
        assert_eq!(head, "aé");

        let tail = HeuristicTokenCounter.truncate_tail("ééééa", 1);
        assert_eq!(tail, "éa");
    }

    /// Word-level vocabulary split on whitespace, so one word is one token.
    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "the": 1, "quick": 2, "brown": 3, "fox": 4 },
            "unk_token": "[UNK]"
        }
    }"#;

    fn word_level_counter() -> (tempfile::TempDir, HfTokenCounter) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL_TOKENIZER).unwrap();
        let counter = HfTokenCounter::from_file(&path).unwrap();
        (dir, counter)
    }

    #[test]
    fn hf_counter_counts_exact_tokens() {
        let (_dir, counter) = word_level_counter();

        assert_eq!(counter.count("the quick brown fox"), 4);
        assert_eq!(counter.count("the   fox"), 2);
        assert_eq!(counter.count("the lazy fox"), 3);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn hf_counter_truncate_head_keeps_first_tokens() {
        let (_dir, counter) = word_level_counter();

        assert_eq!(counter.truncate_head("the quick brown fox", 2), "the quick");
        assert_eq!(counter.truncate_head("the fox", 5), "the fox");
    }

    #[test]
    fn hf_counter_truncate_tail_keeps_last_tokens() {
        let (_dir, counter) = word_level_counter();

        assert_eq!(counter.truncate_tail("the quick brown fox", 2), "brown fox");
        assert_eq!(counter.truncate_tail("the quick brown fox", 0), "");
        assert_eq!(counter.truncate_tail("quick fox", 2), "quick fox");
    }

    #[test]
    fn hf_counter_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{ not a tokenizer").unwrap();

        let result = HfTokenCounter::from_file(&path);

        assert!(matches!(result, Err(GeneratorError::Tokenizer(_))));
    }

    #[test]
    fn hf_counter_reports_missing_file() {
        let result = HfTokenCounter::from_file("/nonexistent/tokenizer.json");
        assert!(matches!(result, Err(GeneratorError::Tokenizer(_))));
    }
}
