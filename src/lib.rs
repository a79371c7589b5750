//! # ModelKit - Pretrained Model Infrastructure
//!
//! Shared infrastructure for working with pretrained NLP models: tokenizers,
//! preprocessors, backbones, and task wrappers, all loadable from and savable
//! to self-describing preset directories.
//!
//! ## Features
//!
//! - **Presets everywhere**: one identifier loads a tokenizer, preprocessor,
//!   backbone, or full task from a local directory, the Hugging Face hub, or
//!   Kaggle
//! - **Validated configuration**: special tokens are checked against the
//!   vocabulary before any state changes; nothing is half-configured
//! - **Weight partitioning**: task-specific parameters carry an ownership tag
//!   and serialize separately from the backbone's
//! - **Family registry**: model families register their layouts, special
//!   tokens, and known presets in one place
//!
//! ## Preset Identifiers
//!
//! | Form                                  | Resolution                       |
//! |---------------------------------------|----------------------------------|
//! | `./some/dir`                          | Local preset directory           |
//! | `hf://namespace/name`                 | Hugging Face hub, cached locally |
//! | `kaggle://namespace/name`             | Kaggle hub, cached locally       |
//! | `gpt2_base_en`                        | Registered built-in preset name  |
//!
//! ## Quick Start
//!
//! ### Loading a Task
//!
//! ```rust,ignore
//! use modelkit::{LoadOptions, Task, TaskKind};
//!
//! let task = Task::from_preset("gpt2_base_en", &LoadOptions::task(TaskKind::CausalLm))?;
//! println!("{}", task.summary());
//!
//! let logits = task.predict(&["The quick brown fox"])?;
//! ```
//!
//! ### Tokenizing
//!
//! ```rust
//! use modelkit::{SpecialTokens, Tokenizer, VocabSource};
//!
//! let mut tokenizer = Tokenizer::new("mistral", SpecialTokens::new("<s>", "</s>"));
//! tokenizer
//!     .set_vocabulary(Some(VocabSource::Bytes(b"<s>\t0\n</s>\t1\nhi\t2\n".to_vec())))
//!     .unwrap();
//!
//! assert_eq!(tokenizer.encode("hi").unwrap(), vec![2]);
//! assert_eq!(tokenizer.decode(&[0, 2, 1]).unwrap(), "hi");
//! ```
//!
//! ### Saving a Fine-Tuned Task
//!
//! ```rust,ignore
//! use modelkit::{LoadOptions, Task, TaskKind};
//!
//! let mut task = Task::from_preset(
//!     "gpt2_base_en",
//!     &LoadOptions::task(TaskKind::TextClassifier).num_classes(2),
//! )?;
//! // ... train ...
//! task.save_to_preset(std::path::Path::new("./my_classifier"))?;
//!
//! // Later, everything comes back from the directory alone.
//! let reloaded = Task::from_preset("./my_classifier", &LoadOptions::default())?;
//! ```
//!
//! ## Modules
//!
//! - [`tokenizer`]: Vocabulary-backed tokenization with validated specials
//! - [`preprocessor`]: Sequence packing in front of a model
//! - [`backbone`]: Model trunks and their parameter layouts
//! - [`task`]: End-to-end task wrappers with weight partitioning
//! - [`preset`]: Identifier parsing, hub fetching, and the family registry
//! - [`vocab`]: The vocabulary file format
//! - [`weights`]: Safetensors reading and writing
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod backbone;
pub mod config;
pub mod error;
pub mod preprocessor;
pub mod preset;
pub mod task;
pub mod tokenizer;
pub mod vocab;
pub mod weights;

// Re-exports for convenience
pub use backbone::{Backbone, BackboneConfig, LayerSummary, ParamScope, Parameter};
pub use config::Config;
pub use error::{ModelKitError, Result};
pub use preprocessor::{Features, PackedFeatures, Preprocessor};
pub use preset::{
    loader_for, HubHandle, HubScheme, ModelFamily, ModelRegistry, PresetLoader, PresetSource,
};
pub use task::{LoadOptions, Task, TaskKind, TrainingConfig};
pub use tokenizer::{SpecialTokens, Tokenizer, VocabSource};
pub use vocab::Vocabulary;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names of every registered preset, across all families.
pub fn list_presets() -> Vec<String> {
    preset::registry::global().all_presets()
}

/// Names of the presets usable for one task kind.
pub fn list_presets_for(kind: TaskKind) -> Vec<String> {
    preset::registry::global().presets_for(kind)
}
