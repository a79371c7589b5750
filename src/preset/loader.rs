//! Loading components out of a materialized preset directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::backbone::{Backbone, BackboneConfig};
use crate::error::{ModelKitError, Result};
use crate::preprocessor::{Preprocessor, PreprocessorConfig};
use crate::preset::registry::{self, ModelFamily};
use crate::task::TaskConfig;
use crate::tokenizer::{Tokenizer, TokenizerConfig, VocabSource};

/// Just the family tag of a backbone config document.
#[derive(Deserialize)]
struct FamilyTag {
    family: String,
}

/// Reads components from one preset directory.
///
/// A loader is already materialized: remote presets are downloaded into the
/// cache before a loader for them exists.
#[derive(Debug, Clone)]
pub struct PresetLoader {
    /// Identifier as the caller wrote it, for error messages.
    preset: String,
    dir: PathBuf,
}

impl PresetLoader {
    pub(crate) fn new(preset: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            preset: preset.into(),
            dir,
        }
    }

    /// The identifier this loader was resolved from.
    pub fn preset(&self) -> &str {
        &self.preset
    }

    /// The preset directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The backbone family tag declared by the preset's `config.json`.
    pub fn family_tag(&self) -> Result<String> {
        let path = self.dir.join(crate::preset::CONFIG_FILE);
        if !path.exists() {
            return Err(ModelKitError::ModelLoad(format!(
                "Preset '{}' has no {}",
                self.preset,
                crate::preset::CONFIG_FILE
            )));
        }
        let tag: FamilyTag = crate::preset::read_json(&path)?;
        Ok(tag.family)
    }

    /// The full backbone configuration.
    pub fn backbone_config(&self) -> Result<BackboneConfig> {
        let path = self.dir.join(crate::preset::CONFIG_FILE);
        if !path.exists() {
            return Err(ModelKitError::ModelLoad(format!(
                "Preset '{}' has no {}",
                self.preset,
                crate::preset::CONFIG_FILE
            )));
        }
        crate::preset::read_json(&path)
    }

    /// The registered family matching the preset's declared tag.
    pub fn model_family(&self) -> Result<&'static ModelFamily> {
        let tag = self.family_tag()?;
        self.family_for(&tag)
    }

    fn family_for(&self, tag: &str) -> Result<&'static ModelFamily> {
        registry::global()
            .family(tag)
            .ok_or_else(|| ModelKitError::UnsupportedPreset {
                preset: self.preset.clone(),
                family: tag.to_string(),
            })
    }

    /// Construct the backbone, optionally loading its weights.
    ///
    /// With `load_weights = false` the parameters stay zero-initialized and
    /// the weight file is never opened.
    pub fn load_backbone(&self, load_weights: bool) -> Result<Backbone> {
        let config = self.backbone_config()?;
        let family = self.family_for(&config.family)?;

        debug!(family = %config.family, preset = %self.preset, "Constructing backbone");
        let params = family.layout(&config);
        let mut backbone = Backbone::with_params(config, params);

        if load_weights {
            let path = self.dir.join(crate::preset::MODEL_WEIGHTS_FILE);
            if !path.exists() {
                return Err(ModelKitError::ModelLoad(format!(
                    "Preset '{}' has no {}",
                    self.preset,
                    crate::preset::MODEL_WEIGHTS_FILE
                )));
            }
            debug!(path = %path.display(), "Loading backbone weights");
            backbone.load_weights(&path)?;
        }

        Ok(backbone)
    }

    /// Construct the tokenizer.
    ///
    /// Prefers the preset's own `tokenizer.json`; a preset without one gets
    /// the registered family's special tokens and the vocabulary asset.
    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        let config_path = self.dir.join(crate::preset::TOKENIZER_CONFIG_FILE);
        if config_path.exists() {
            let config: TokenizerConfig = crate::preset::read_json(&config_path)?;
            if self.dir.join(crate::preset::CONFIG_FILE).exists() {
                let declared = self.family_tag()?;
                if declared != config.family {
                    return Err(ModelKitError::Validation(format!(
                        "Preset '{}' declares backbone family '{declared}' but its \
                         tokenizer belongs to '{}'",
                        self.preset, config.family
                    )));
                }
            }
            return Tokenizer::from_config(&config, &self.dir);
        }

        let family = self.model_family()?;
        let vocab_path = self.dir.join(crate::preset::TOKENIZER_ASSET);
        if !vocab_path.exists() {
            return Err(ModelKitError::ModelLoad(format!(
                "Preset '{}' has no tokenizer assets",
                self.preset
            )));
        }
        let mut tokenizer = Tokenizer::new(family.name(), family.special_tokens().clone());
        tokenizer.set_vocabulary(Some(VocabSource::File(vocab_path)))?;
        Ok(tokenizer)
    }

    /// Construct the preprocessor.
    ///
    /// A preset without a `preprocessor.json` gets default packing around
    /// its tokenizer.
    pub fn load_preprocessor(&self) -> Result<Preprocessor> {
        let path = self.dir.join(crate::preset::PREPROCESSOR_CONFIG_FILE);
        if path.exists() {
            let config: PreprocessorConfig = crate::preset::read_json(&path)?;
            return Preprocessor::from_config(&config, &self.dir);
        }

        let tokenizer = self.load_tokenizer()?;
        Ok(Preprocessor::new(Some(tokenizer)))
    }

    /// The saved task configuration, when the preset has one.
    pub fn task_config(&self) -> Result<Option<TaskConfig>> {
        let path = self.dir.join(crate::preset::TASK_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(crate::preset::read_json(&path)?))
    }

    /// Whether the preset carries task-specific weights.
    pub fn has_task_weights(&self) -> bool {
        self.dir.join(crate::preset::TASK_WEIGHTS_FILE).exists()
    }
}
