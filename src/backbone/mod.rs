//! Model backbones: architecture configuration plus parameter store.
//!
//! A [`Backbone`] is the task-agnostic trunk of a model: its
//! [`BackboneConfig`] and a flat list of named [`Parameter`]s. Parameter
//! layouts are per-family functions ([`mistral_layout`], [`gpt2_layout`])
//! that map a config to zero-initialized tensors; real values arrive later
//! from a preset's weight file.
//!
//! Every parameter carries an explicit [`ParamScope`] so that task-specific
//! weights can be partitioned from backbone weights without comparing
//! object identities.

use ndarray::{Array2, ArrayD, Axis, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{ModelKitError, Result};
use crate::preprocessor::PackedFeatures;

/// Architecture hyperparameters (`config.json` in a preset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Backbone family tag, e.g. `mistral`.
    pub family: String,
    /// Token vocabulary size.
    pub vocab_size: usize,
    /// Number of transformer layers.
    pub num_layers: usize,
    /// Number of attention heads.
    pub num_heads: usize,
    /// Model width.
    pub hidden_dim: usize,
    /// Feed-forward width.
    pub intermediate_dim: usize,
    /// Longest supported sequence.
    pub max_sequence_length: usize,
}

/// Who owns a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamScope {
    /// Owned by the backbone trunk.
    Backbone,
    /// Owned by a task head.
    Head,
}

/// A named tensor with an ownership tag.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Dotted path, e.g. `layers.0.attention.wq.weight`.
    pub name: String,
    /// Ownership tag.
    pub scope: ParamScope,
    /// Tensor data.
    pub data: ArrayD<f32>,
}

impl Parameter {
    /// Create a zero-initialized parameter.
    pub fn zeros(name: impl Into<String>, scope: ParamScope, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            scope,
            data: ArrayD::zeros(shape.to_vec()),
        }
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Tensor shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// One displayable layer: a named group of parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    /// Group name, e.g. `layers.0`.
    pub name: String,
    /// Total parameter elements in the group.
    pub params: usize,
}

/// Task-agnostic model trunk.
#[derive(Debug, Clone)]
pub struct Backbone {
    config: BackboneConfig,
    params: Vec<Parameter>,
}

impl Backbone {
    /// Assemble a backbone from a config and its laid-out parameters.
    pub fn with_params(config: BackboneConfig, params: Vec<Parameter>) -> Self {
        Self { config, params }
    }

    /// Architecture configuration.
    pub fn config(&self) -> &BackboneConfig {
        &self.config
    }

    /// All parameters in layout order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Mutable access to all parameters.
    pub fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Mutable lookup by name.
    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// Total parameter elements.
    pub fn num_params(&self) -> usize {
        self.params.iter().map(Parameter::count).sum()
    }

    /// A 2D view of a named parameter.
    pub fn param_2d(&self, name: &str) -> Result<ndarray::ArrayView2<'_, f32>> {
        let param = self
            .param(name)
            .ok_or_else(|| ModelKitError::ModelLoad(format!("Missing parameter '{name}'")))?;
        param.data.view().into_dimensionality::<Ix2>().map_err(|_| {
            ModelKitError::ModelLoad(format!(
                "Expected 2D tensor for '{name}', got {:?}",
                param.shape()
            ))
        })
    }

    /// A 1D view of a named parameter.
    pub fn param_1d(&self, name: &str) -> Result<ndarray::ArrayView1<'_, f32>> {
        let param = self
            .param(name)
            .ok_or_else(|| ModelKitError::ModelLoad(format!("Missing parameter '{name}'")))?;
        param.data.view().into_dimensionality::<Ix1>().map_err(|_| {
            ModelKitError::ModelLoad(format!(
                "Expected 1D tensor for '{name}', got {:?}",
                param.shape()
            ))
        })
    }

    /// Parameters grouped by layer for display.
    ///
    /// Grouping is by name prefix: `layers.3.ffn.up.weight` belongs to
    /// `layers.3`, anything else to its first path segment.
    pub fn layers(&self) -> Vec<LayerSummary> {
        let mut layers: Vec<LayerSummary> = Vec::new();
        for param in &self.params {
            let group = layer_group(&param.name);
            match layers.iter_mut().find(|l| l.name == group) {
                Some(layer) => layer.params += param.count(),
                None => layers.push(LayerSummary {
                    name: group.to_string(),
                    params: param.count(),
                }),
            }
        }
        layers
    }

    /// Mean-pool token embeddings over the non-padding positions.
    ///
    /// Returns one row per input sequence. This is the reference forward
    /// path; it involves no attention math.
    pub fn pooled_embedding(&self, batch: &PackedFeatures) -> Result<Array2<f32>> {
        let embedding = self.param_2d("token_embedding.weight")?;
        let hidden = embedding.ncols();

        let mut pooled = Array2::<f32>::zeros((batch.token_ids.len(), hidden));
        for (row, (ids, mask)) in batch
            .token_ids
            .iter()
            .zip(batch.padding_mask.iter())
            .enumerate()
        {
            let mut count = 0usize;
            for (&id, &valid) in ids.iter().zip(mask.iter()) {
                if !valid {
                    continue;
                }
                let id = id as usize;
                if id >= embedding.nrows() {
                    return Err(ModelKitError::Validation(format!(
                        "Token id {id} out of range for vocabulary of {}",
                        embedding.nrows()
                    )));
                }
                let mut target = pooled.index_axis_mut(Axis(0), row);
                target += &embedding.index_axis(Axis(0), id);
                count += 1;
            }
            if count > 0 {
                let mut target = pooled.index_axis_mut(Axis(0), row);
                target /= count as f32;
            }
        }
        Ok(pooled)
    }

    /// Load backbone weights from a safetensors file.
    ///
    /// Tensors are matched by parameter name; a disagreeing shape fails with
    /// [`ModelKitError::WeightShapeMismatch`] and a missing tensor with
    /// [`ModelKitError::ModelLoad`]. Extra tensors in the file are ignored.
    pub fn load_weights(&mut self, path: &std::path::Path) -> Result<()> {
        crate::weights::load_into(path, self.params.iter_mut())
    }

    /// Write `config.json` and `model.weights.safetensors` under `dir`.
    pub fn save_to_preset(&self, dir: &std::path::Path) -> Result<()> {
        crate::preset::write_json(&dir.join(crate::preset::CONFIG_FILE), &self.config)?;
        crate::weights::save_parameters(
            &dir.join(crate::preset::MODEL_WEIGHTS_FILE),
            self.params.iter(),
        )
    }

    /// Load a backbone from a preset identifier.
    ///
    /// With `load_weights = false` the parameters stay zero-initialized,
    /// which is how fresh task heads are stacked on pretrained configs
    /// without paying for a download.
    pub fn from_preset(preset: &str, load_weights: bool) -> Result<Self> {
        crate::preset::loader_for(preset)?.load_backbone(load_weights)
    }

    /// Names of every registered preset, across all families.
    pub fn presets() -> Vec<String> {
        crate::preset::registry::global().all_presets()
    }
}

fn layer_group(name: &str) -> &str {
    let mut segments = name.split('.');
    match (segments.next(), segments.next()) {
        (Some("layers"), Some(index)) => &name[.."layers.".len() + index.len()],
        (Some(first), _) => first,
        (None, _) => name,
    }
}

/// Parameter layout for the mistral family (RMS norms, no biases).
pub fn mistral_layout(config: &BackboneConfig) -> Vec<Parameter> {
    let hidden = config.hidden_dim;
    let inter = config.intermediate_dim;
    let scope = ParamScope::Backbone;

    let mut params = vec![Parameter::zeros(
        "token_embedding.weight",
        scope,
        &[config.vocab_size, hidden],
    )];

    for i in 0..config.num_layers {
        for proj in ["wq", "wk", "wv", "wo"] {
            params.push(Parameter::zeros(
                format!("layers.{i}.attention.{proj}.weight"),
                scope,
                &[hidden, hidden],
            ));
        }
        params.push(Parameter::zeros(
            format!("layers.{i}.attention_norm.scale"),
            scope,
            &[hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.ffn.gate.weight"),
            scope,
            &[hidden, inter],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.ffn.up.weight"),
            scope,
            &[hidden, inter],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.ffn.down.weight"),
            scope,
            &[inter, hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.ffn_norm.scale"),
            scope,
            &[hidden],
        ));
    }

    params.push(Parameter::zeros("final_norm.scale", scope, &[hidden]));
    params
}

/// Parameter layout for the gpt2 family (layer norms with bias, learned
/// position embeddings, fused qkv projection).
pub fn gpt2_layout(config: &BackboneConfig) -> Vec<Parameter> {
    let hidden = config.hidden_dim;
    let inter = config.intermediate_dim;
    let scope = ParamScope::Backbone;

    let mut params = vec![
        Parameter::zeros(
            "token_embedding.weight",
            scope,
            &[config.vocab_size, hidden],
        ),
        Parameter::zeros(
            "position_embedding.weight",
            scope,
            &[config.max_sequence_length, hidden],
        ),
    ];

    for i in 0..config.num_layers {
        for norm in ["ln_1", "ln_2"] {
            params.push(Parameter::zeros(
                format!("layers.{i}.{norm}.weight"),
                scope,
                &[hidden],
            ));
            params.push(Parameter::zeros(
                format!("layers.{i}.{norm}.bias"),
                scope,
                &[hidden],
            ));
        }
        params.push(Parameter::zeros(
            format!("layers.{i}.attention.c_attn.weight"),
            scope,
            &[hidden, 3 * hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.attention.c_attn.bias"),
            scope,
            &[3 * hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.attention.c_proj.weight"),
            scope,
            &[hidden, hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.attention.c_proj.bias"),
            scope,
            &[hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.mlp.c_fc.weight"),
            scope,
            &[hidden, inter],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.mlp.c_fc.bias"),
            scope,
            &[inter],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.mlp.c_proj.weight"),
            scope,
            &[inter, hidden],
        ));
        params.push(Parameter::zeros(
            format!("layers.{i}.mlp.c_proj.bias"),
            scope,
            &[hidden],
        ));
    }

    params.push(Parameter::zeros("final_norm.weight", scope, &[hidden]));
    params.push(Parameter::zeros("final_norm.bias", scope, &[hidden]));
    params
}
