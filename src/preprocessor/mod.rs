//! Input preprocessing: tokenization plus sequence packing.
//!
//! A [`Preprocessor`] turns raw strings into the dense id batches a model
//! consumes. Packing follows the usual start/end convention: an optional
//! start token, the encoded text, an optional end token, truncated to
//! `sequence_length` (keeping the end token) and padded to it.
//!
//! Labels and sample weights ride along untouched so that a preprocessor can
//! sit in front of a training pipeline without knowing anything about the
//! target representation.
//!
//! # Example
//!
//! ```
//! use modelkit::preprocessor::{Features, Preprocessor};
//! use modelkit::tokenizer::{SpecialTokens, Tokenizer, VocabSource};
//!
//! let mut tokenizer = Tokenizer::new("mistral", SpecialTokens::new("<s>", "</s>"));
//! tokenizer
//!     .set_vocabulary(Some(VocabSource::Bytes(b"<s>\t0\n</s>\t1\nhi\t2\n".to_vec())))
//!     .unwrap();
//!
//! let preprocessor = Preprocessor::new(Some(tokenizer)).sequence_length(4);
//! let features = preprocessor.process_inputs(&["hi"]).unwrap();
//! match features {
//!     Features::Packed(packed) => {
//!         assert_eq!(packed.token_ids[0], vec![0, 2, 1, 0]);
//!         assert_eq!(packed.padding_mask[0], vec![true, true, true, false]);
//!     }
//!     Features::Raw(_) => unreachable!(),
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelKitError, Result};
use crate::tokenizer::{Tokenizer, TokenizerConfig};

/// Packed sequence length used when none is configured.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 512;

/// Output of [`Preprocessor::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Features {
    /// Dense id batch with its padding mask.
    Packed(PackedFeatures),
    /// Inputs passed through unchanged because no tokenizer is attached.
    Raw(Vec<String>),
}

/// A batch of packed token ids.
///
/// `padding_mask[i][j]` is `true` where `token_ids[i][j]` carries input and
/// `false` where it is padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFeatures {
    /// Token ids, one row per input, each `sequence_length` long.
    pub token_ids: Vec<Vec<u32>>,
    /// Validity mask aligned with `token_ids`.
    pub padding_mask: Vec<Vec<bool>>,
}

/// Serialized preprocessor configuration (`preprocessor.json` in a preset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Backbone family tag.
    pub family: String,
    /// Packed sequence length.
    pub sequence_length: usize,
    /// Whether packing prepends the start token.
    pub add_start_token: bool,
    /// Whether packing appends the end token.
    pub add_end_token: bool,
    /// Nested tokenizer configuration.
    pub tokenizer: TokenizerConfig,
}

/// Tokenization and packing front-end for a task.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Tokenizer, or `None` to pass inputs through unprocessed.
    pub tokenizer: Option<Tokenizer>,
    sequence_length: usize,
    add_start_token: bool,
    add_end_token: bool,
}

impl Preprocessor {
    /// Create a preprocessor around an optional tokenizer.
    ///
    /// Without a tokenizer, [`process`] is the identity on its inputs;
    /// preprocessing is then the caller's responsibility.
    ///
    /// [`process`]: Self::process
    pub fn new(tokenizer: Option<Tokenizer>) -> Self {
        Self {
            tokenizer,
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            add_start_token: true,
            add_end_token: true,
        }
    }

    /// Set the packed sequence length.
    pub fn sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Enable or disable the start token.
    pub fn add_start_token(mut self, add: bool) -> Self {
        self.add_start_token = add;
        self
    }

    /// Enable or disable the end token.
    pub fn add_end_token(mut self, add: bool) -> Self {
        self.add_end_token = add;
        self
    }

    /// The configured sequence length.
    pub fn sequence_length_value(&self) -> usize {
        self.sequence_length
    }

    /// Transform a batch, carrying labels and sample weights through.
    ///
    /// With a tokenizer attached the inputs are encoded and packed; without
    /// one they are returned as [`Features::Raw`]. Labels and sample weights
    /// are never inspected or altered.
    pub fn process<Y, W>(
        &self,
        inputs: &[impl AsRef<str>],
        labels: Option<Y>,
        sample_weights: Option<W>,
    ) -> Result<(Features, Option<Y>, Option<W>)> {
        let Some(tokenizer) = self.tokenizer.as_ref() else {
            let raw = inputs.iter().map(|s| s.as_ref().to_string()).collect();
            return Ok((Features::Raw(raw), labels, sample_weights));
        };

        let mut token_ids = Vec::with_capacity(inputs.len());
        let mut padding_mask = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (ids, mask) = self.pack(tokenizer, input.as_ref())?;
            token_ids.push(ids);
            padding_mask.push(mask);
        }

        Ok((
            Features::Packed(PackedFeatures {
                token_ids,
                padding_mask,
            }),
            labels,
            sample_weights,
        ))
    }

    /// [`process`] without labels or sample weights.
    ///
    /// [`process`]: Self::process
    pub fn process_inputs(&self, inputs: &[impl AsRef<str>]) -> Result<Features> {
        let (features, _, _) = self.process::<(), ()>(inputs, None, None)?;
        Ok(features)
    }

    fn pack(&self, tokenizer: &Tokenizer, text: &str) -> Result<(Vec<u32>, Vec<bool>)> {
        let unconfigured = || {
            ModelKitError::Tokenizer(
                "No vocabulary configured; call set_vocabulary first".to_string(),
            )
        };

        let mut ids = Vec::new();
        if self.add_start_token {
            ids.push(tokenizer.start_token_id().ok_or_else(unconfigured)?);
        }
        ids.extend(tokenizer.encode(text)?);
        if self.add_end_token {
            ids.push(tokenizer.end_token_id().ok_or_else(unconfigured)?);
        }

        if ids.len() > self.sequence_length {
            ids.truncate(self.sequence_length);
            // The end marker survives truncation.
            if self.add_end_token {
                if let (Some(last), Some(end)) = (ids.last_mut(), tokenizer.end_token_id()) {
                    *last = end;
                }
            }
        }

        let mut mask = vec![true; ids.len()];
        let pad_id = tokenizer.pad_token_id();
        while ids.len() < self.sequence_length {
            ids.push(pad_id);
            mask.push(false);
        }

        Ok((ids, mask))
    }

    /// Serializable configuration for this preprocessor.
    ///
    /// Fails when no tokenizer is attached, since the persisted document
    /// nests the tokenizer's configuration.
    pub fn config(&self) -> Result<PreprocessorConfig> {
        Ok(self.config_with(self.tokenizer_for_persist()?))
    }

    fn tokenizer_for_persist(&self) -> Result<&Tokenizer> {
        self.tokenizer.as_ref().ok_or_else(|| {
            ModelKitError::Validation(
                "Preprocessor has no tokenizer to persist; attach one first".to_string(),
            )
        })
    }

    fn config_with(&self, tokenizer: &Tokenizer) -> PreprocessorConfig {
        PreprocessorConfig {
            family: tokenizer.family().to_string(),
            sequence_length: self.sequence_length,
            add_start_token: self.add_start_token,
            add_end_token: self.add_end_token,
            tokenizer: tokenizer.config(),
        }
    }

    /// Reconstruct a preprocessor from persisted configuration.
    pub fn from_config(config: &PreprocessorConfig, preset_dir: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_config(&config.tokenizer, preset_dir)?;
        Ok(Self {
            tokenizer: Some(tokenizer),
            sequence_length: config.sequence_length,
            add_start_token: config.add_start_token,
            add_end_token: config.add_end_token,
        })
    }

    /// Write `preprocessor.json` and the tokenizer files under `dir`.
    pub fn save_to_preset(&self, dir: &Path) -> Result<()> {
        let tokenizer = self.tokenizer_for_persist()?;
        crate::preset::write_json(
            &dir.join(crate::preset::PREPROCESSOR_CONFIG_FILE),
            &self.config_with(tokenizer),
        )?;
        tokenizer.save_to_preset(dir)
    }

    /// Load a preprocessor from a preset identifier.
    pub fn from_preset(preset: &str) -> Result<Self> {
        crate::preset::loader_for(preset)?.load_preprocessor()
    }

    /// Names of every registered preset, across all families.
    pub fn presets() -> Vec<String> {
        crate::preset::registry::global().all_presets()
    }
}
