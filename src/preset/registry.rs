//! Model family registry.
//!
//! Every loadable architecture is a [`ModelFamily`]: a tag (`mistral`,
//! `gpt2`), the special tokens its tokenizer requires, the task kinds it
//! supports, the function that lays out its parameters, and a catalog of
//! named presets.
//!
//! The registry is append-only: it is assembled once through
//! [`RegistryBuilder`], which rejects duplicate family tags, and exposed as
//! an immutable snapshot afterwards. Library code reads the process-wide
//! snapshot from [`global`]; embedding applications may install their own
//! with [`init_global`] before first use.

use std::sync::OnceLock;

use crate::backbone::{gpt2_layout, mistral_layout, BackboneConfig, Parameter};
use crate::error::{ModelKitError, Result};
use crate::task::TaskKind;
use crate::tokenizer::SpecialTokens;

/// Maps an architecture config onto zero-initialized parameters.
pub type LayoutFn = fn(&BackboneConfig) -> Vec<Parameter>;

/// A named preset in a family's catalog.
#[derive(Debug, Clone)]
pub struct PresetEntry {
    /// Short name callers pass to `from_preset`, e.g. `gpt2_base_en`.
    pub name: String,
    /// Hub handle the name expands to.
    pub handle: String,
    /// Task kind for task-level presets, `None` for backbone-level ones.
    pub kind: Option<TaskKind>,
}

/// A registered backbone family.
#[derive(Debug, Clone)]
pub struct ModelFamily {
    name: String,
    special_tokens: SpecialTokens,
    task_kinds: Vec<TaskKind>,
    layout: LayoutFn,
    presets: Vec<PresetEntry>,
}

impl ModelFamily {
    /// Create a family with no task kinds and an empty catalog.
    pub fn new(name: impl Into<String>, special_tokens: SpecialTokens, layout: LayoutFn) -> Self {
        Self {
            name: name.into(),
            special_tokens,
            task_kinds: Vec::new(),
            layout,
            presets: Vec::new(),
        }
    }

    /// Declare a supported task kind.
    pub fn task_kind(mut self, kind: TaskKind) -> Self {
        if !self.task_kinds.contains(&kind) {
            self.task_kinds.push(kind);
        }
        self
    }

    /// Add a backbone-level preset to the catalog.
    pub fn preset(mut self, name: impl Into<String>, handle: impl Into<String>) -> Self {
        self.presets.push(PresetEntry {
            name: name.into(),
            handle: handle.into(),
            kind: None,
        });
        self
    }

    /// Add a task-level preset to the catalog.
    pub fn task_preset(
        mut self,
        name: impl Into<String>,
        handle: impl Into<String>,
        kind: TaskKind,
    ) -> Self {
        self.presets.push(PresetEntry {
            name: name.into(),
            handle: handle.into(),
            kind: Some(kind),
        });
        self
    }

    /// Family tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Special tokens this family's tokenizer requires.
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    /// Whether the family registers the task kind.
    pub fn supports(&self, kind: TaskKind) -> bool {
        self.task_kinds.contains(&kind)
    }

    /// Lay out zero-initialized parameters for a config.
    pub fn layout(&self, config: &BackboneConfig) -> Vec<Parameter> {
        (self.layout)(config)
    }

    /// The family's preset catalog.
    pub fn presets(&self) -> &[PresetEntry] {
        &self.presets
    }
}

/// Append-only registry construction.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    families: Vec<ModelFamily>,
}

impl RegistryBuilder {
    /// Start an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family.
    ///
    /// A duplicate family tag is a [`ModelKitError::Configuration`] error,
    /// so resolution stays deterministic by construction.
    pub fn register(mut self, family: ModelFamily) -> Result<Self> {
        if self.families.iter().any(|f| f.name == family.name) {
            return Err(ModelKitError::Configuration(format!(
                "Model family '{}' is already registered",
                family.name
            )));
        }
        self.families.push(family);
        Ok(self)
    }

    /// Freeze into an immutable registry.
    pub fn build(self) -> ModelRegistry {
        ModelRegistry {
            families: self.families,
        }
    }
}

/// Immutable snapshot of registered model families.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    families: Vec<ModelFamily>,
}

impl ModelRegistry {
    /// Builder pre-populated with the built-in families.
    pub fn builtin_builder() -> RegistryBuilder {
        let mistral = ModelFamily::new(
            "mistral",
            SpecialTokens::new("<s>", "</s>"),
            mistral_layout,
        )
        .task_kind(TaskKind::CausalLm)
        .preset(
            "mistral_7b_en",
            "kaggle://keras/mistral/keras/mistral_7b_en",
        )
        .preset(
            "mistral_instruct_7b_en",
            "kaggle://keras/mistral/keras/mistral_instruct_7b_en",
        );

        let gpt2 = ModelFamily::new(
            "gpt2",
            SpecialTokens::new("<|endoftext|>", "<|endoftext|>"),
            gpt2_layout,
        )
        .task_kind(TaskKind::CausalLm)
        .task_kind(TaskKind::TextClassifier)
        .preset("gpt2_base_en", "kaggle://keras/gpt2/keras/gpt2_base_en")
        .preset("gpt2_medium_en", "kaggle://keras/gpt2/keras/gpt2_medium_en")
        .task_preset(
            "gpt2_base_en_cnn_dailymail",
            "kaggle://keras/gpt2/keras/gpt2_base_en_cnn_dailymail",
            TaskKind::CausalLm,
        );

        RegistryBuilder {
            families: vec![mistral, gpt2],
        }
    }

    /// Registry containing only the built-in families.
    pub fn builtin() -> Self {
        Self::builtin_builder().build()
    }

    /// Look up a family by tag.
    pub fn family(&self, name: &str) -> Option<&ModelFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Whether a family tag is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.family(name).is_some()
    }

    /// Number of registered families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Iterate families in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelFamily> {
        self.families.iter()
    }

    /// Expand a built-in preset name to its hub handle.
    ///
    /// Catalogs are scanned in registration order and the first entry with
    /// the name wins; later duplicates never shadow it.
    pub fn builtin_handle(&self, preset: &str) -> Option<&str> {
        self.families
            .iter()
            .flat_map(|f| f.presets.iter())
            .find(|entry| entry.name == preset)
            .map(|entry| entry.handle.as_str())
    }

    /// Names of every registered preset, first-insertion-wins on duplicates.
    pub fn all_presets(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in self.families.iter().flat_map(|f| f.presets.iter()) {
            if !names.iter().any(|n| n == &entry.name) {
                names.push(entry.name.clone());
            }
        }
        names
    }

    /// Preset names usable for a task kind.
    ///
    /// Backbone-level presets of every family supporting the kind, plus
    /// task-level presets registered for exactly that kind. Ordering and
    /// duplicate handling follow [`all_presets`].
    ///
    /// [`all_presets`]: Self::all_presets
    pub fn presets_for(&self, kind: TaskKind) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for family in &self.families {
            for entry in &family.presets {
                let usable = match entry.kind {
                    None => family.supports(kind),
                    Some(entry_kind) => entry_kind == kind,
                };
                if usable && !names.iter().any(|n| n == &entry.name) {
                    names.push(entry.name.clone());
                }
            }
        }
        names
    }
}

static GLOBAL_REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// Process-wide registry snapshot.
///
/// Initializes to the built-in families on first use.
pub fn global() -> &'static ModelRegistry {
    GLOBAL_REGISTRY.get_or_init(ModelRegistry::builtin)
}

/// Install a custom registry as the process-wide snapshot.
///
/// Must run before the first [`global`] call; once the snapshot exists it is
/// immutable and installation fails with [`ModelKitError::Configuration`].
pub fn init_global(registry: ModelRegistry) -> Result<()> {
    GLOBAL_REGISTRY.set(registry).map_err(|_| {
        ModelKitError::Configuration("Global model registry is already initialized".to_string())
    })
}
