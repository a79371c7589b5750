//! Tokenizers with model-specific special tokens.
//!
//! A [`Tokenizer`] wraps a [`Vocabulary`] and the special tokens its model
//! family requires. The vocabulary is optional at construction time so that
//! architectures can be instantiated before their assets are available; it
//! is attached later with [`Tokenizer::set_vocabulary`], which refuses any
//! vocabulary that does not define the family's special tokens.
//!
//! # Example
//!
//! ```
//! use modelkit::tokenizer::{SpecialTokens, Tokenizer, VocabSource};
//!
//! let mut tokenizer = Tokenizer::new("mistral", SpecialTokens::new("<s>", "</s>"));
//! assert!(tokenizer.start_token_id().is_none());
//!
//! let vocab = b"<s>\t0\n</s>\t1\nhi\t2\n".to_vec();
//! tokenizer.set_vocabulary(Some(VocabSource::Bytes(vocab))).unwrap();
//! assert_eq!(tokenizer.start_token_id(), Some(0));
//! assert_eq!(tokenizer.end_token_id(), Some(1));
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelKitError, Result};
use crate::vocab::Vocabulary;

/// Token id used for padding when the family declares no pad token.
pub const DEFAULT_PAD_ID: u32 = 0;

/// Conventional unknown-token string.
pub const UNK_TOKEN: &str = "<unk>";

/// Special tokens a model family requires its vocabulary to define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    /// Sequence start token (e.g. `<s>`).
    pub start_token: String,
    /// Sequence end token (e.g. `</s>`). May equal the start token.
    pub end_token: String,
    /// Padding token, when the family declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_token: Option<String>,
}

impl SpecialTokens {
    /// Create special tokens with the given start and end markers.
    pub fn new(start_token: impl Into<String>, end_token: impl Into<String>) -> Self {
        Self {
            start_token: start_token.into(),
            end_token: end_token.into(),
            pad_token: None,
        }
    }

    /// Set the padding token.
    pub fn pad_token(mut self, token: impl Into<String>) -> Self {
        self.pad_token = Some(token.into());
        self
    }

    /// Tokens the vocabulary must define, without duplicates.
    pub fn required(&self) -> Vec<&str> {
        let mut required = vec![self.start_token.as_str()];
        if self.end_token != self.start_token {
            required.push(self.end_token.as_str());
        }
        required
    }
}

/// Where a vocabulary comes from.
#[derive(Debug, Clone)]
pub enum VocabSource {
    /// A vocabulary file on disk.
    File(PathBuf),
    /// An in-memory vocabulary buffer.
    Bytes(Vec<u8>),
}

impl From<PathBuf> for VocabSource {
    fn from(path: PathBuf) -> Self {
        VocabSource::File(path)
    }
}

impl From<Vec<u8>> for VocabSource {
    fn from(bytes: Vec<u8>) -> Self {
        VocabSource::Bytes(bytes)
    }
}

/// Serialized tokenizer configuration (`tokenizer.json` in a preset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Backbone family tag this tokenizer belongs to.
    pub family: String,
    /// Special tokens the vocabulary must define.
    #[serde(flatten)]
    pub special_tokens: SpecialTokens,
    /// Preset-relative path of the vocabulary asset.
    pub vocabulary: String,
}

/// Greedy longest-match tokenizer with validated special tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    /// Backbone family tag, recorded in persisted configuration.
    family: String,
    /// Special tokens
    special_tokens: SpecialTokens,
    /// Vocabulary, absent until configured
    vocab: Option<Vocabulary>,
    /// Resolved id of the start token; `Some` iff a vocabulary is configured
    start_token_id: Option<u32>,
    /// Resolved id of the end token; `Some` iff a vocabulary is configured
    end_token_id: Option<u32>,
}

impl Tokenizer {
    /// Create a tokenizer with no vocabulary.
    pub fn new(family: impl Into<String>, special_tokens: SpecialTokens) -> Self {
        Self {
            family: family.into(),
            special_tokens,
            vocab: None,
            start_token_id: None,
            end_token_id: None,
        }
    }

    /// Backbone family tag.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Special tokens this tokenizer requires.
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    /// Attach, replace, or clear the vocabulary.
    ///
    /// With `Some(source)`, the resource is parsed and checked for every
    /// required special token before any state changes; a missing token is a
    /// [`ModelKitError::Configuration`] error and the tokenizer keeps its
    /// previous vocabulary (or none). With `None`, the vocabulary and the
    /// resolved special token ids are cleared.
    pub fn set_vocabulary(&mut self, source: Option<VocabSource>) -> Result<()> {
        let Some(source) = source else {
            self.vocab = None;
            self.start_token_id = None;
            self.end_token_id = None;
            return Ok(());
        };

        let vocab = match source {
            VocabSource::File(path) => Vocabulary::from_file(&path)?,
            VocabSource::Bytes(bytes) => Vocabulary::from_bytes(&bytes)?,
        };

        for token in self.special_tokens.required() {
            if !vocab.contains(token) {
                return Err(ModelKitError::Configuration(format!(
                    "Cannot find special token '{token}' in the provided vocabulary. \
                     Provide a vocabulary that defines '{token}', or load a preset \
                     vocabulary with from_preset."
                )));
            }
        }

        self.start_token_id = vocab.id(&self.special_tokens.start_token);
        self.end_token_id = vocab.id(&self.special_tokens.end_token);
        self.vocab = Some(vocab);
        Ok(())
    }

    /// Resolved id of the start token, if a vocabulary is configured.
    pub fn start_token_id(&self) -> Option<u32> {
        self.start_token_id
    }

    /// Resolved id of the end token, if a vocabulary is configured.
    pub fn end_token_id(&self) -> Option<u32> {
        self.end_token_id
    }

    /// Id used for padding.
    ///
    /// The family's pad token when it is declared and present in the
    /// vocabulary, [`DEFAULT_PAD_ID`] otherwise.
    pub fn pad_token_id(&self) -> u32 {
        self.special_tokens
            .pad_token
            .as_deref()
            .and_then(|token| self.vocab.as_ref().and_then(|v| v.id(token)))
            .unwrap_or(DEFAULT_PAD_ID)
    }

    /// The configured vocabulary, if any.
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocab.as_ref()
    }

    /// Number of vocabulary entries (0 while unconfigured).
    pub fn vocabulary_size(&self) -> usize {
        self.vocab.as_ref().map_or(0, Vocabulary::len)
    }

    /// Look up the id for a token.
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab.as_ref().and_then(|v| v.id(token))
    }

    /// Look up the token for an id.
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.vocab.as_ref().and_then(|v| v.token(id))
    }

    fn configured_vocab(&self) -> Result<&Vocabulary> {
        self.vocab.as_ref().ok_or_else(|| {
            ModelKitError::Tokenizer(
                "No vocabulary configured; call set_vocabulary first".to_string(),
            )
        })
    }

    /// Tokenize text to ids by greedy longest-match against the vocabulary.
    ///
    /// Input with no vocabulary match maps to `<unk>` when the vocabulary
    /// defines it and is skipped otherwise. Start and end tokens are not
    /// added here; packing is the preprocessor's job.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let vocab = self.configured_vocab()?;
        let unk_id = vocab.id(UNK_TOKEN);

        let mut ids = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            let limit = (pos + vocab.max_token_len()).min(text.len());

            let mut matched = None;
            let mut end = limit;
            while end > pos {
                if text.is_char_boundary(end) {
                    if let Some(id) = vocab.id(&text[pos..end]) {
                        matched = Some((end, id));
                        break;
                    }
                }
                end -= 1;
            }

            match matched {
                Some((end, id)) => {
                    ids.push(id);
                    pos = end;
                }
                None => {
                    if let Some(unk) = unk_id {
                        ids.push(unk);
                    }
                    pos += text[pos..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }

        Ok(ids)
    }

    /// Decode ids back to text, skipping start and end tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self.configured_vocab()?;
        let text = ids
            .iter()
            .filter(|&&id| Some(id) != self.start_token_id && Some(id) != self.end_token_id)
            .filter_map(|&id| vocab.token(id))
            .collect();
        Ok(text)
    }

    /// Serializable configuration for this tokenizer.
    pub fn config(&self) -> TokenizerConfig {
        TokenizerConfig {
            family: self.family.clone(),
            special_tokens: self.special_tokens.clone(),
            vocabulary: crate::preset::TOKENIZER_ASSET.to_string(),
        }
    }

    /// Reconstruct a tokenizer from persisted configuration.
    ///
    /// `preset_dir` anchors the config's relative vocabulary path.
    pub fn from_config(config: &TokenizerConfig, preset_dir: &Path) -> Result<Self> {
        let mut tokenizer = Self::new(config.family.clone(), config.special_tokens.clone());
        let vocab_path = preset_dir.join(&config.vocabulary);
        tokenizer.set_vocabulary(Some(VocabSource::File(vocab_path)))?;
        Ok(tokenizer)
    }

    /// Write `tokenizer.json` and the vocabulary asset under `dir`.
    pub fn save_to_preset(&self, dir: &Path) -> Result<()> {
        let vocab = self.vocab.as_ref().ok_or_else(|| {
            ModelKitError::Validation(
                "Tokenizer has no vocabulary to persist; call set_vocabulary first".to_string(),
            )
        })?;

        let asset_path = dir.join(crate::preset::TOKENIZER_ASSET);
        if let Some(parent) = asset_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        vocab.save_to_file(&asset_path)?;

        crate::preset::write_json(&dir.join(crate::preset::TOKENIZER_CONFIG_FILE), &self.config())
    }

    /// Load a tokenizer from a preset identifier.
    ///
    /// See the crate docs for the identifier grammar.
    pub fn from_preset(preset: &str) -> Result<Self> {
        crate::preset::loader_for(preset)?.load_tokenizer()
    }

    /// Names of every registered preset, across all families.
    pub fn presets() -> Vec<String> {
        crate::preset::registry::global().all_presets()
    }
}
