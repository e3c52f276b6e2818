//! Token counters
//!
//! [`HfTokenCounter`] wraps a HuggingFace `tokenizer.json`. When no tokenizer
//! file is configured, [`ApproxTokenCounter`] estimates roughly four
//! characters per token.

use std::path::{Path, PathBuf};

use tokenbench_core::TokenCounter;
use tokenizers::Tokenizer;

use crate::error::SamplerError;

/// Token counter backed by a HuggingFace tokenizer
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
    source: PathBuf,
}

impl HfTokenCounter {
    /// Load from a `tokenizer.json` file or a directory containing one
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SamplerError> {
        let path = path.as_ref();
        let file = if path.is_dir() {
            path.join("tokenizer.json")
        } else {
            path.to_path_buf()
        };

        if !file.exists() {
            return Err(SamplerError::Tokenizer(format!(
                "tokenizer file not found: {}",
                file.display()
            )));
        }

        let tokenizer = Tokenizer::from_file(&file).map_err(|e| {
            SamplerError::Tokenizer(format!("failed to load {}: {e}", file.display()))
        })?;

        tracing::debug!(path = %file.display(), "Loaded tokenizer");
        Ok(Self {
            tokenizer,
            source: file,
        })
    }

    /// File the tokenizer was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Tokenizer failed, estimating token count");
                ApproxTokenCounter.count(text)
            }
        }
    }
}

impl std::fmt::Debug for HfTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenCounter")
            .field("source", &self.source)
            .finish()
    }
}

/// Estimates ~4 characters per token
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            0
        } else {
            chars.div_ceil(4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "hello": 1, "world": 2},
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_approx_counter() {
        assert_eq!(ApproxTokenCounter.count(""), 0);
        assert_eq!(ApproxTokenCounter.count("abc"), 1);
        assert_eq!(ApproxTokenCounter.count("abcd"), 1);
        assert_eq!(ApproxTokenCounter.count("abcde"), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, WORD_LEVEL_TOKENIZER).unwrap();

        let counter = HfTokenCounter::from_path(&path).unwrap();
        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.count("hello there world"), 3);
        assert_eq!(counter.source(), path.as_path());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), WORD_LEVEL_TOKENIZER).unwrap();

        let counter = HfTokenCounter::from_path(dir.path()).unwrap();
        assert_eq!(counter.count("world world world"), 3);
    }

    #[test]
    fn test_missing_tokenizer() {
        let dir = TempDir::new().unwrap();
        let result = HfTokenCounter::from_path(dir.path());
        assert!(matches!(result, Err(SamplerError::Tokenizer(_))));
    }

    #[test]
    fn test_malformed_tokenizer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(
            HfTokenCounter::from_path(&path),
            Err(SamplerError::Tokenizer(_))
        ));
    }
}
