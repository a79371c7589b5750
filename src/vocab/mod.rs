//! Token vocabulary storage.
//!
//! A [`Vocabulary`] is the plain token-to-id mapping behind a tokenizer.
//! The on-disk format is UTF-8 text with one `token<TAB>id` entry per line;
//! parsing is strict so that a broken vocabulary asset fails loudly instead
//! of silently dropping entries.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ModelKitError, Result};

/// Bidirectional token-id mapping.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Vocabulary mapping (token -> id)
    token_to_id: HashMap<String, u32>,
    /// Reverse vocabulary (id -> token)
    id_to_token: HashMap<u32, String>,
    /// Longest token in bytes, bounds greedy matching
    max_token_len: usize,
}

impl Vocabulary {
    /// Parse a vocabulary from its text representation.
    ///
    /// Blank lines are ignored. Anything else that is not a `token<TAB>id`
    /// pair, and any duplicate token or id, is a [`ModelKitError::Tokenizer`]
    /// error.
    pub fn parse(content: &str) -> Result<Self> {
        let mut vocab = Self::default();

        for (lineno, line) in content.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let token = parts.next().unwrap_or_default();
            let id = parts
                .next()
                .and_then(|raw| raw.parse::<u32>().ok())
                .ok_or_else(|| {
                    ModelKitError::Tokenizer(format!(
                        "Vocabulary line {}: expected 'token<TAB>id', got '{line}'",
                        lineno + 1
                    ))
                })?;

            if vocab.token_to_id.contains_key(token) {
                return Err(ModelKitError::Tokenizer(format!(
                    "Vocabulary line {}: duplicate token '{token}'",
                    lineno + 1
                )));
            }
            if let Some(existing) = vocab.id_to_token.get(&id) {
                return Err(ModelKitError::Tokenizer(format!(
                    "Vocabulary line {}: id {id} already maps to '{existing}'",
                    lineno + 1
                )));
            }

            vocab.max_token_len = vocab.max_token_len.max(token.len());
            vocab.token_to_id.insert(token.to_string(), id);
            vocab.id_to_token.insert(id, token.to_string());
        }

        Ok(vocab)
    }

    /// Load a vocabulary from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a vocabulary from an in-memory byte buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| ModelKitError::Tokenizer(format!("Vocabulary is not UTF-8: {e}")))?;
        Self::parse(content)
    }

    /// Write the vocabulary to `path` in the line format [`parse`] accepts.
    ///
    /// Entries are sorted by id so the output is stable across runs.
    ///
    /// [`parse`]: Self::parse
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut entries: Vec<(&u32, &String)> = self.id_to_token.iter().collect();
        entries.sort_by_key(|(id, _)| **id);

        let mut out = String::new();
        for (id, token) in entries {
            out.push_str(token);
            out.push('\t');
            out.push_str(&id.to_string());
            out.push('\n');
        }
        std::fs::write(path.as_ref(), out)?;
        Ok(())
    }

    /// Look up the id for a token.
    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Look up the token for an id.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Whether the vocabulary contains the token.
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// Length in bytes of the longest token.
    pub fn max_token_len(&self) -> usize {
        self.max_token_len
    }
}
