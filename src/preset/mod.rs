//! Preset resolution.
//!
//! A preset is a directory of configuration documents, vocabulary assets,
//! and weight files describing one pretrained model. This module turns a
//! preset identifier (local path, hub handle, or built-in name) into a
//! [`PresetLoader`] over that directory, dispatching through the
//! [`registry`] of model families.
//!
//! # Preset layout
//!
//! ```text
//! config.json                      backbone configuration (declares the family)
//! model.weights.safetensors        backbone weights
//! task.json                        task configuration (optional)
//! task.weights.safetensors         task-specific weights (optional)
//! preprocessor.json                preprocessor configuration
//! tokenizer.json                   tokenizer configuration
//! assets/tokenizer/vocabulary.txt  vocabulary resource
//! ```
//!
//! # Example
//!
//! ```no_run
//! use modelkit::preset::loader_for;
//!
//! let loader = loader_for("gpt2_base_en")?;
//! let backbone = loader.load_backbone(true)?;
//! println!("{} params", backbone.num_params());
//! # Ok::<(), modelkit::ModelKitError>(())
//! ```

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub mod hub;
pub mod identifier;
pub mod loader;
pub mod registry;

pub use identifier::{HubHandle, HubScheme, PresetSource};
pub use loader::PresetLoader;
pub use registry::{ModelFamily, ModelRegistry, PresetEntry, RegistryBuilder};

/// Backbone configuration document.
pub const CONFIG_FILE: &str = "config.json";

/// Backbone weights file.
pub const MODEL_WEIGHTS_FILE: &str = "model.weights.safetensors";

/// Task configuration document.
pub const TASK_CONFIG_FILE: &str = "task.json";

/// Task-specific weights file.
pub const TASK_WEIGHTS_FILE: &str = "task.weights.safetensors";

/// Preprocessor configuration document.
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor.json";

/// Tokenizer configuration document.
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer.json";

/// Vocabulary asset, relative to the preset root.
pub const TOKENIZER_ASSET: &str = "assets/tokenizer/vocabulary.txt";

/// Required suffix for every weight file name.
pub const WEIGHTS_SUFFIX: &str = ".weights.safetensors";

/// Write a pretty-printed JSON document, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Resolve a preset identifier to a loader over its local directory.
///
/// Local paths are used in place; hub handles and built-in names go through
/// the preset cache, downloading on a miss.
pub fn loader_for(preset: &str) -> Result<PresetLoader> {
    let dir = match PresetSource::parse(preset)? {
        PresetSource::Local(path) => path,
        PresetSource::Hub(handle) => hub::materialize(&handle, crate::config::global())?,
    };
    Ok(PresetLoader::new(preset, dir))
}
