//! Tasks: a backbone, an optional preprocessor, and a task head.
//!
//! A [`Task`] is the end-to-end unit users interact with. The `backbone`
//! and `preprocessor` are plain public fields: swapping either is ordinary
//! assignment, with no reconstruction ceremony. Task-specific weights are
//! the parameters tagged [`ParamScope::Head`]; everything the backbone owns
//! stays untouched by task-weight operations.
//!
//! # Example
//!
//! ```no_run
//! use modelkit::task::{LoadOptions, Task, TaskKind};
//!
//! let task = Task::from_preset("gpt2_base_en", &LoadOptions::task(TaskKind::CausalLm))?;
//! println!("{}", task.summary());
//! # Ok::<(), modelkit::ModelKitError>(())
//! ```

use std::fmt;
use std::path::Path;

use ndarray::{Array2, ArrayD, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use crate::backbone::{Backbone, LayerSummary, ParamScope, Parameter};
use crate::error::{ModelKitError, Result};
use crate::preprocessor::{Features, PackedFeatures, Preprocessor};
use crate::preset::registry;

/// What a task models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Next-token language modeling.
    CausalLm,
    /// Sequence classification.
    TextClassifier,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::CausalLm => "causal_lm",
            TaskKind::TextClassifier => "text_classifier",
        })
    }
}

impl std::str::FromStr for TaskKind {
    type Err = ModelKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "causal_lm" => Ok(TaskKind::CausalLm),
            "text_classifier" => Ok(TaskKind::TextClassifier),
            _ => Err(ModelKitError::Validation(format!(
                "Unknown task kind '{s}' (expected 'causal_lm' or 'text_classifier')"
            ))),
        }
    }
}

/// Optimizer and loss selection for training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Optimizer name.
    pub optimizer: String,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Loss function name.
    pub loss: String,
}

impl TrainingConfig {
    /// The documented default training configuration per task kind.
    pub fn for_kind(kind: TaskKind) -> Self {
        match kind {
            TaskKind::CausalLm => Self {
                optimizer: "adam".to_string(),
                learning_rate: 2e-5,
                loss: "sparse_categorical_crossentropy".to_string(),
            },
            TaskKind::TextClassifier => Self {
                optimizer: "adam".to_string(),
                learning_rate: 5e-5,
                loss: "sparse_categorical_crossentropy".to_string(),
            },
        }
    }
}

/// Name and shape of one task-head parameter.
///
/// Recorded in `task.json` so a reload can recreate head parameters that
/// were added after construction, before their saved weights are read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadParamConfig {
    /// Parameter name.
    pub name: String,
    /// Tensor shape.
    pub shape: Vec<usize>,
}

/// Serialized task configuration (`task.json` in a preset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task kind.
    pub kind: TaskKind,
    /// Backbone family tag, cross-referencing the preset's `config.json`.
    pub family: String,
    /// Classifier output width, absent for other kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_classes: Option<usize>,
    /// Head parameters by name and shape, in creation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub head: Vec<HeadParamConfig>,
    /// Training configuration the task was compiled with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingConfig>,
}

/// Options for [`Task::from_preset`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Task kind to construct. `None` defers to the preset's saved task
    /// configuration.
    pub kind: Option<TaskKind>,
    /// Whether to load backbone weights (on by default).
    pub load_weights: bool,
    /// Whether to apply a training configuration (on by default).
    pub compile: bool,
    /// Override the preprocessor's packed sequence length.
    pub sequence_length: Option<usize>,
    /// Classifier output width; required for classifier kinds unless the
    /// preset's saved task configuration carries one.
    pub num_classes: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            kind: None,
            load_weights: true,
            compile: true,
            sequence_length: None,
            num_classes: None,
        }
    }
}

impl LoadOptions {
    /// Options naming a concrete task kind.
    pub fn task(kind: TaskKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Set whether backbone weights are loaded.
    pub fn load_weights(mut self, load: bool) -> Self {
        self.load_weights = load;
        self
    }

    /// Set whether a training configuration is applied.
    pub fn compile(mut self, compile: bool) -> Self {
        self.compile = compile;
        self
    }

    /// Override the packed sequence length.
    pub fn sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = Some(length);
        self
    }

    /// Set the classifier output width.
    pub fn num_classes(mut self, classes: usize) -> Self {
        self.num_classes = Some(classes);
        self
    }
}

/// A model wired for one task.
#[derive(Debug, Clone)]
pub struct Task {
    kind: TaskKind,
    /// Model trunk. Plain field, swappable without reconstruction.
    pub backbone: Backbone,
    /// Input pipeline; `None` leaves preprocessing to the caller.
    pub preprocessor: Option<Preprocessor>,
    /// Task-head parameters, all tagged [`ParamScope::Head`].
    head: Vec<Parameter>,
    num_classes: Option<usize>,
    training: Option<TrainingConfig>,
}

impl Task {
    /// A language-modeling task over the backbone.
    ///
    /// The output projection is tied to the token embedding, so a fresh
    /// causal-lm task has no task-specific weights.
    pub fn causal_lm(backbone: Backbone, preprocessor: Option<Preprocessor>) -> Self {
        Self {
            kind: TaskKind::CausalLm,
            backbone,
            preprocessor,
            head: Vec::new(),
            num_classes: None,
            training: Some(TrainingConfig::for_kind(TaskKind::CausalLm)),
        }
    }

    /// A classification task with a fresh dense head.
    pub fn text_classifier(
        backbone: Backbone,
        preprocessor: Option<Preprocessor>,
        num_classes: usize,
    ) -> Self {
        let hidden = backbone.config().hidden_dim;
        let head = vec![
            Parameter::zeros("head.dense.weight", ParamScope::Head, &[hidden, num_classes]),
            Parameter::zeros("head.dense.bias", ParamScope::Head, &[num_classes]),
        ];
        Self {
            kind: TaskKind::TextClassifier,
            backbone,
            preprocessor,
            head,
            num_classes: Some(num_classes),
            training: Some(TrainingConfig::for_kind(TaskKind::TextClassifier)),
        }
    }

    /// Task kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Classifier output width, when applicable.
    pub fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    /// The active training configuration, if compiled.
    pub fn training(&self) -> Option<&TrainingConfig> {
        self.training.as_ref()
    }

    /// Replace the training configuration.
    pub fn compile(&mut self, config: TrainingConfig) {
        self.training = Some(config);
    }

    /// Drop the training configuration.
    ///
    /// The constructors apply the per-kind default; this is the
    /// `compile = false` form for tasks built directly rather than through
    /// [`Task::from_preset`].
    pub fn uncompiled(mut self) -> Self {
        self.training = None;
        self
    }

    /// Task-head parameters.
    pub fn head(&self) -> &[Parameter] {
        &self.head
    }

    /// Mutable access to a head parameter by name.
    pub fn head_param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.head.iter_mut().find(|p| p.name == name)
    }

    /// Attach an extra task-owned parameter.
    ///
    /// The ownership tag is assigned here, at creation time.
    pub fn add_head_weight(&mut self, name: impl Into<String>, data: ArrayD<f32>) {
        self.head.push(Parameter {
            name: name.into(),
            scope: ParamScope::Head,
            data,
        });
    }

    /// Whether any owned parameter is task-specific.
    pub fn has_task_weights(&self) -> bool {
        self.head.iter().any(|p| p.scope == ParamScope::Head)
    }

    fn check_weights_path(path: &Path) -> Result<()> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !name.ends_with(crate::preset::WEIGHTS_SUFFIX) {
            return Err(ModelKitError::Validation(format!(
                "Task weights file must end in '{}', got '{}'",
                crate::preset::WEIGHTS_SUFFIX,
                path.display()
            )));
        }
        Ok(())
    }

    /// Serialize the task-specific weights only.
    ///
    /// The file name must end in `.weights.safetensors`, and there must be
    /// something task-specific to save; both are checked before anything is
    /// written.
    pub fn save_task_weights(&self, path: &Path) -> Result<()> {
        Self::check_weights_path(path)?;
        if !self.has_task_weights() {
            return Err(ModelKitError::Validation(
                "Task has no task-specific weights to save; use save_to_preset for the full model"
                    .to_string(),
            ));
        }
        crate::weights::save_parameters(path, self.head.iter())
    }

    /// Load task-specific weights, leaving the backbone untouched.
    ///
    /// Tensors map onto head parameters by name; a disagreeing shape is a
    /// [`ModelKitError::WeightShapeMismatch`] error, and a tensor no head
    /// parameter claims is a [`ModelKitError::ModelLoad`] error rather than
    /// a silent drop.
    pub fn load_task_weights(&mut self, path: &Path) -> Result<()> {
        Self::check_weights_path(path)?;
        crate::weights::load_into_exact(path, self.head.iter_mut())
    }

    /// Serializable configuration for this task.
    pub fn config(&self) -> TaskConfig {
        TaskConfig {
            kind: self.kind,
            family: self.backbone.config().family.clone(),
            num_classes: self.num_classes,
            head: self
                .head
                .iter()
                .map(|p| HeadParamConfig {
                    name: p.name.clone(),
                    shape: p.shape().to_vec(),
                })
                .collect(),
            training: self.training.clone(),
        }
    }

    /// Write the whole task as a preset directory.
    ///
    /// Order: task config, task weights (only when some exist), then the
    /// preprocessor's files, then the backbone's. A task without a
    /// preprocessor cannot be saved; that is checked before any write.
    pub fn save_to_preset(&self, dir: &Path) -> Result<()> {
        let preprocessor = self.preprocessor.as_ref().ok_or_else(|| {
            ModelKitError::Validation(
                "Cannot save a task without a preprocessor; attach one or save the \
                 backbone directly"
                    .to_string(),
            )
        })?;

        crate::preset::write_json(&dir.join(crate::preset::TASK_CONFIG_FILE), &self.config())?;
        if self.has_task_weights() {
            self.save_task_weights(&dir.join(crate::preset::TASK_WEIGHTS_FILE))?;
        }
        preprocessor.save_to_preset(dir)?;
        self.backbone.save_to_preset(dir)
    }

    /// Load a task from a preset identifier.
    ///
    /// The task kind comes from `options.kind`, or from the preset's saved
    /// task configuration. A load with neither is under-specified and fails
    /// with [`ModelKitError::Usage`]; an explicit kind that contradicts the
    /// saved configuration is a [`ModelKitError::Validation`] error.
    pub fn from_preset(preset: &str, options: &LoadOptions) -> Result<Self> {
        let loader = crate::preset::loader_for(preset)?;
        let saved = loader.task_config()?;

        let kind = match (options.kind, saved.as_ref()) {
            (Some(kind), Some(config)) if config.kind != kind => {
                return Err(ModelKitError::Validation(format!(
                    "Preset '{preset}' was saved as a '{}' task, not '{kind}'",
                    config.kind
                )));
            }
            (Some(kind), _) => kind,
            (None, Some(config)) => config.kind,
            (None, None) => {
                return Err(ModelKitError::Usage(format!(
                    "Preset '{preset}' has no task configuration; name a concrete task \
                     kind in LoadOptions (e.g. LoadOptions::task(TaskKind::TextClassifier))"
                )));
            }
        };

        let family = loader.model_family()?;
        if !family.supports(kind) {
            return Err(ModelKitError::UnsupportedTask {
                family: family.name().to_string(),
                kind: kind.to_string(),
            });
        }

        let backbone = loader.load_backbone(options.load_weights)?;
        let mut preprocessor = Some(loader.load_preprocessor()?);
        if let Some(length) = options.sequence_length {
            preprocessor = preprocessor.map(|p| p.sequence_length(length));
        }

        let mut task = match kind {
            TaskKind::CausalLm => Self::causal_lm(backbone, preprocessor),
            TaskKind::TextClassifier => {
                let num_classes = options
                    .num_classes
                    .or_else(|| saved.as_ref().and_then(|c| c.num_classes))
                    .ok_or_else(|| {
                        ModelKitError::Validation(format!(
                            "Preset '{preset}' does not record num_classes; set \
                             LoadOptions.num_classes for text_classifier tasks"
                        ))
                    })?;
                Self::text_classifier(backbone, preprocessor, num_classes)
            }
        };

        // Head parameters added after construction are recorded in the task
        // config; recreate them so their saved weights have somewhere to land.
        if let Some(config) = saved.as_ref() {
            for param in &config.head {
                if !task.head.iter().any(|p| p.name == param.name) {
                    task.add_head_weight(param.name.clone(), ArrayD::zeros(param.shape.clone()));
                }
            }
        }

        if options.load_weights && loader.has_task_weights() {
            task.load_task_weights(&loader.dir().join(crate::preset::TASK_WEIGHTS_FILE))?;
        }

        if options.compile {
            if let Some(training) = saved.and_then(|c| c.training) {
                task.training = Some(training);
            }
        } else {
            task.training = None;
        }

        Ok(task)
    }

    /// Names of every registered preset usable for a task kind.
    pub fn presets(kind: TaskKind) -> Vec<String> {
        registry::global().presets_for(kind)
    }

    /// Displayable layers: the backbone's, then the head.
    ///
    /// The preprocessor is an input pipeline, not a layer, and never
    /// appears here.
    pub fn layers(&self) -> Vec<LayerSummary> {
        let mut layers = self.backbone.layers();
        if !self.head.is_empty() {
            layers.push(LayerSummary {
                name: "head".to_string(),
                params: self.head.iter().map(Parameter::count).sum(),
            });
        }
        layers
    }

    /// Plain-text report of the task's structure.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let config = self.backbone.config();
        out.push_str(&format!("Task: {} (family: {})\n", self.kind, config.family));

        match self.preprocessor.as_ref().and_then(|p| p.tokenizer.as_ref()) {
            Some(tokenizer) => out.push_str(&format!(
                "Tokenizer: {} (vocabulary: {})\n",
                tokenizer.family(),
                tokenizer.vocabulary_size()
            )),
            None => out.push_str("Tokenizer: none\n"),
        }

        out.push('\n');
        out.push_str(&format!("{:<24} {:>12}\n", "Layer", "Params"));
        for layer in self.layers() {
            out.push_str(&format!("{:<24} {:>12}\n", layer.name, layer.params));
        }

        let backbone_params = self.backbone.num_params();
        let head_params: usize = self.head.iter().map(Parameter::count).sum();
        out.push('\n');
        out.push_str(&format!("Backbone params: {backbone_params}\n"));
        out.push_str(&format!("Task params: {head_params}\n"));
        out.push_str(&format!("Total params: {}\n", backbone_params + head_params));
        out
    }

    /// Run the preprocessor, or pass inputs through when there is none.
    pub fn preprocess<Y, W>(
        &self,
        inputs: &[impl AsRef<str>],
        labels: Option<Y>,
        sample_weights: Option<W>,
    ) -> Result<(Features, Option<Y>, Option<W>)> {
        match &self.preprocessor {
            Some(preprocessor) => preprocessor.process(inputs, labels, sample_weights),
            None => {
                let raw = inputs.iter().map(|s| s.as_ref().to_string()).collect();
                Ok((Features::Raw(raw), labels, sample_weights))
            }
        }
    }

    /// Preprocess and run the reference forward path on raw strings.
    pub fn predict(&self, inputs: &[impl AsRef<str>]) -> Result<Array2<f32>> {
        let preprocessor = self.preprocessor.as_ref().ok_or_else(|| {
            ModelKitError::Usage(
                "Task has no preprocessor; pack inputs yourself and call predict_packed"
                    .to_string(),
            )
        })?;
        match preprocessor.process_inputs(inputs)? {
            Features::Packed(batch) => self.predict_packed(&batch),
            Features::Raw(_) => Err(ModelKitError::Usage(
                "Task's preprocessor has no tokenizer; pack inputs yourself and call \
                 predict_packed"
                    .to_string(),
            )),
        }
    }

    /// Reference forward path on an already-packed batch.
    ///
    /// Mean-pooled embeddings projected through the classifier head, or
    /// through the tied token embedding for language modeling. One row of
    /// logits per input.
    pub fn predict_packed(&self, batch: &PackedFeatures) -> Result<Array2<f32>> {
        let pooled = self.backbone.pooled_embedding(batch)?;
        match self.kind {
            TaskKind::TextClassifier => {
                let weight = self.head_param_2d("head.dense.weight")?;
                let bias = self.head_param_1d("head.dense.bias")?;
                Ok(pooled.dot(&weight) + &bias)
            }
            TaskKind::CausalLm => {
                let embedding = self.backbone.param_2d("token_embedding.weight")?;
                Ok(pooled.dot(&embedding.t()))
            }
        }
    }

    fn head_param(&self, name: &str) -> Result<&Parameter> {
        self.head
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ModelKitError::ModelLoad(format!("Missing parameter '{name}'")))
    }

    fn head_param_2d(&self, name: &str) -> Result<ndarray::ArrayView2<'_, f32>> {
        let param = self.head_param(name)?;
        param.data.view().into_dimensionality::<Ix2>().map_err(|_| {
            ModelKitError::ModelLoad(format!(
                "Expected 2D tensor for '{name}', got {:?}",
                param.shape()
            ))
        })
    }

    fn head_param_1d(&self, name: &str) -> Result<ndarray::ArrayView1<'_, f32>> {
        let param = self.head_param(name)?;
        param.data.view().into_dimensionality::<Ix1>().map_err(|_| {
            ModelKitError::ModelLoad(format!(
                "Expected 1D tensor for '{name}', got {:?}",
                param.shape()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::{mistral_layout, BackboneConfig};
    use crate::tokenizer::{SpecialTokens, Tokenizer, VocabSource};

    fn tiny_backbone() -> Backbone {
        let config = BackboneConfig {
            family: "mistral".to_string(),
            vocab_size: 8,
            num_layers: 1,
            num_heads: 2,
            hidden_dim: 4,
            intermediate_dim: 8,
            max_sequence_length: 16,
        };
        let params = mistral_layout(&config);
        Backbone::with_params(config, params)
    }

    fn tiny_preprocessor() -> Preprocessor {
        let mut tokenizer = Tokenizer::new("mistral", SpecialTokens::new("<s>", "</s>"));
        tokenizer
            .set_vocabulary(Some(VocabSource::Bytes(
                b"<s>\t0\n</s>\t1\nhi\t2\nthere\t3\n".to_vec(),
            )))
            .unwrap();
        Preprocessor::new(Some(tokenizer)).sequence_length(6)
    }

    #[test]
    fn test_causal_lm_has_no_task_weights() {
        let task = Task::causal_lm(tiny_backbone(), None);
        assert!(!task.has_task_weights());
        assert_eq!(task.kind(), TaskKind::CausalLm);
    }

    #[test]
    fn test_classifier_head_is_task_scoped() {
        let task = Task::text_classifier(tiny_backbone(), None, 3);
        assert!(task.has_task_weights());
        assert_eq!(task.num_classes(), Some(3));
        assert!(task.head().iter().all(|p| p.scope == ParamScope::Head));
        assert_eq!(task.head()[0].shape(), &[4, 3]);
    }

    #[test]
    fn test_add_head_weight_flips_partition() {
        let mut task = Task::causal_lm(tiny_backbone(), None);
        assert!(!task.has_task_weights());

        task.add_head_weight("head.extra.weight", ArrayD::zeros(vec![2, 2]));
        assert!(task.has_task_weights());
    }

    #[test]
    fn test_added_head_weights_recorded_in_config() {
        let mut task = Task::causal_lm(tiny_backbone(), None);
        task.add_head_weight("head.extra.weight", ArrayD::zeros(vec![2, 2]));

        let config = task.config();
        assert_eq!(config.head.len(), 1);
        assert_eq!(config.head[0].name, "head.extra.weight");
        assert_eq!(config.head[0].shape, vec![2, 2]);
    }

    #[test]
    fn test_constructors_apply_default_training() {
        let task = Task::text_classifier(tiny_backbone(), None, 2);
        let training = task.training().unwrap();
        assert_eq!(training.optimizer, "adam");
        assert!((training.learning_rate - 5e-5).abs() < 1e-12);
    }

    #[test]
    fn test_compile_replaces_training() {
        let mut task = Task::causal_lm(tiny_backbone(), None);
        task.compile(TrainingConfig {
            optimizer: "sgd".to_string(),
            learning_rate: 0.1,
            loss: "mse".to_string(),
        });
        assert_eq!(task.training().unwrap().optimizer, "sgd");
    }

    #[test]
    fn test_uncompiled_task_has_no_training() {
        let mut task = Task::causal_lm(tiny_backbone(), None).uncompiled();
        assert!(task.training().is_none());

        task.compile(TrainingConfig::for_kind(TaskKind::CausalLm));
        assert!(task.training().is_some());
    }

    #[test]
    fn test_save_task_weights_rejects_wrong_suffix_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");

        let task = Task::text_classifier(tiny_backbone(), None, 2);
        let err = task.save_task_weights(&path).unwrap_err();
        assert!(matches!(err, ModelKitError::Validation(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_save_task_weights_requires_task_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.weights.safetensors");

        let task = Task::causal_lm(tiny_backbone(), None);
        let err = task.save_task_weights(&path).unwrap_err();
        assert!(matches!(err, ModelKitError::Validation(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_task_weights_roundtrip_leaves_backbone_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.weights.safetensors");

        let mut task = Task::text_classifier(tiny_backbone(), None, 2);
        task.head[0].data[[0, 0]] = 42.0;
        task.save_task_weights(&path).unwrap();

        let mut reloaded = Task::text_classifier(tiny_backbone(), None, 2);
        reloaded.backbone.param_mut("final_norm.scale").unwrap().data[[0]] = 7.0;
        reloaded.load_task_weights(&path).unwrap();

        assert!((reloaded.head()[0].data[[0, 0]] - 42.0).abs() < 1e-6);
        // Backbone parameters are not part of task weights.
        assert!(
            (reloaded.backbone.param("final_norm.scale").unwrap().data[[0]] - 7.0).abs() < 1e-6
        );
    }

    #[test]
    fn test_load_task_weights_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.weights.safetensors");

        let task = Task::text_classifier(tiny_backbone(), None, 2);
        task.save_task_weights(&path).unwrap();

        let mut wider = Task::text_classifier(tiny_backbone(), None, 3);
        let err = wider.load_task_weights(&path).unwrap_err();
        assert!(matches!(err, ModelKitError::WeightShapeMismatch { .. }));
    }

    #[test]
    fn test_load_task_weights_rejects_unclaimed_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.weights.safetensors");

        let mut donor = Task::causal_lm(tiny_backbone(), None);
        donor.add_head_weight("head.extra.weight", ArrayD::zeros(vec![2, 2]));
        donor.save_task_weights(&path).unwrap();

        // A task without that parameter must refuse the file, not drop it.
        let mut plain = Task::causal_lm(tiny_backbone(), None);
        let err = plain.load_task_weights(&path).unwrap_err();
        assert!(matches!(err, ModelKitError::ModelLoad(_)));
        assert!(err.to_string().contains("head.extra.weight"));
    }

    #[test]
    fn test_save_to_preset_requires_preprocessor_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::text_classifier(tiny_backbone(), None, 2);

        let err = task.save_to_preset(dir.path()).unwrap_err();
        assert!(matches!(err, ModelKitError::Validation(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_to_preset_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::text_classifier(tiny_backbone(), Some(tiny_preprocessor()), 2);
        task.save_to_preset(dir.path()).unwrap();

        for file in [
            crate::preset::TASK_CONFIG_FILE,
            crate::preset::TASK_WEIGHTS_FILE,
            crate::preset::PREPROCESSOR_CONFIG_FILE,
            crate::preset::TOKENIZER_CONFIG_FILE,
            crate::preset::CONFIG_FILE,
            crate::preset::MODEL_WEIGHTS_FILE,
            crate::preset::TOKENIZER_ASSET,
        ] {
            assert!(dir.path().join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn test_save_to_preset_skips_task_weights_without_head() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::causal_lm(tiny_backbone(), Some(tiny_preprocessor()));
        task.save_to_preset(dir.path()).unwrap();

        assert!(dir.path().join(crate::preset::TASK_CONFIG_FILE).exists());
        assert!(!dir.path().join(crate::preset::TASK_WEIGHTS_FILE).exists());
    }

    #[test]
    fn test_from_preset_reads_saved_kind() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::text_classifier(tiny_backbone(), Some(tiny_preprocessor()), 2);
        task.save_to_preset(dir.path()).unwrap();

        let preset = dir.path().to_str().unwrap();
        let reloaded = Task::from_preset(preset, &LoadOptions::default()).unwrap();
        assert_eq!(reloaded.kind(), TaskKind::TextClassifier);
        assert_eq!(reloaded.num_classes(), Some(2));
    }

    #[test]
    fn test_from_preset_without_task_config_needs_explicit_kind() {
        let dir = tempfile::tempdir().unwrap();
        let backbone = tiny_backbone();
        backbone.save_to_preset(dir.path()).unwrap();
        tiny_preprocessor().save_to_preset(dir.path()).unwrap();

        let preset = dir.path().to_str().unwrap();
        let err = Task::from_preset(preset, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ModelKitError::Usage(_)));

        let task = Task::from_preset(preset, &LoadOptions::task(TaskKind::CausalLm)).unwrap();
        assert_eq!(task.kind(), TaskKind::CausalLm);
    }

    #[test]
    fn test_from_preset_kind_contradiction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::causal_lm(tiny_backbone(), Some(tiny_preprocessor()));
        task.save_to_preset(dir.path()).unwrap();

        let preset = dir.path().to_str().unwrap();
        let err = Task::from_preset(
            preset,
            &LoadOptions::task(TaskKind::TextClassifier).num_classes(2),
        )
        .unwrap_err();
        assert!(matches!(err, ModelKitError::Validation(_)));
    }

    #[test]
    fn test_from_preset_unsupported_kind_for_family() {
        let dir = tempfile::tempdir().unwrap();
        let backbone = tiny_backbone();
        backbone.save_to_preset(dir.path()).unwrap();
        tiny_preprocessor().save_to_preset(dir.path()).unwrap();

        // The mistral family registers no classifier task.
        let preset = dir.path().to_str().unwrap();
        let err = Task::from_preset(
            preset,
            &LoadOptions::task(TaskKind::TextClassifier).num_classes(2),
        )
        .unwrap_err();
        match err {
            ModelKitError::UnsupportedTask { family, kind } => {
                assert_eq!(family, "mistral");
                assert_eq!(kind, "text_classifier");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_layers_exclude_preprocessor_and_include_head() {
        let task = Task::text_classifier(tiny_backbone(), Some(tiny_preprocessor()), 2);
        let layers = task.layers();

        assert!(layers.iter().any(|l| l.name == "head"));
        assert!(layers.iter().all(|l| !l.name.contains("preprocessor")));
        assert!(layers.iter().all(|l| !l.name.contains("tokenizer")));
    }

    #[test]
    fn test_summary_shows_tokenizer() {
        let task = Task::text_classifier(tiny_backbone(), Some(tiny_preprocessor()), 2);
        let summary = task.summary();
        assert!(summary.contains("Tokenizer: mistral (vocabulary: 4)"));
        assert!(summary.contains("head"));
        assert!(summary.contains("Total params:"));
    }

    #[test]
    fn test_preprocess_passthrough_without_preprocessor() {
        let task = Task::causal_lm(tiny_backbone(), None);
        let (features, labels, _) = task
            .preprocess(&["hi"], Some(vec![1u8]), None::<Vec<f32>>)
            .unwrap();
        assert_eq!(features, Features::Raw(vec!["hi".to_string()]));
        assert_eq!(labels, Some(vec![1u8]));
    }

    #[test]
    fn test_predict_shapes() {
        let classifier = Task::text_classifier(tiny_backbone(), Some(tiny_preprocessor()), 3);
        let logits = classifier.predict(&["hi", "there"]).unwrap();
        assert_eq!(logits.shape(), &[2, 3]);

        let lm = Task::causal_lm(tiny_backbone(), Some(tiny_preprocessor()));
        let logits = lm.predict(&["hi"]).unwrap();
        assert_eq!(logits.shape(), &[1, 8]);
    }

    #[test]
    fn test_predict_without_preprocessor_is_usage_error() {
        let task = Task::causal_lm(tiny_backbone(), None);
        let err = task.predict(&["hi"]).unwrap_err();
        assert!(matches!(err, ModelKitError::Usage(_)));
    }
}
