//! Safetensors weight file helpers.
//!
//! All weight files in a preset use the safetensors format with f32
//! little-endian tensors. Loading is strict: dtype and shape must agree
//! with the declared parameter, and a disagreement is an error rather than
//! a silent cast or resize.

use std::collections::HashMap;
use std::path::Path;

use ndarray::ArrayD;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::backbone::Parameter;
use crate::error::{ModelKitError, Result};

/// Read every tensor in a safetensors file into f32 arrays.
pub fn load_named_tensors(path: &Path) -> Result<HashMap<String, ArrayD<f32>>> {
    let bytes = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| ModelKitError::ModelLoad(format!("Failed to parse weights file: {e}")))?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        let array = tensor_to_array(&name, &view)?;
        out.insert(name.to_string(), array);
    }
    Ok(out)
}

fn tensor_to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>> {
    if view.dtype() != Dtype::F32 {
        return Err(ModelKitError::ModelLoad(format!(
            "Expected f32 tensor for '{name}', got {:?}",
            view.dtype()
        )));
    }

    let data: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    ArrayD::from_shape_vec(view.shape().to_vec(), data)
        .map_err(|e| ModelKitError::ModelLoad(format!("Bad tensor layout for '{name}': {e}")))
}

/// Assign file tensors onto parameters, matching by name.
///
/// Extra tensors in the file are ignored; a missing tensor is a
/// [`ModelKitError::ModelLoad`] error and a shape disagreement a
/// [`ModelKitError::WeightShapeMismatch`], raised before the parameter is
/// touched.
pub fn load_into<'a>(
    path: &Path,
    params: impl Iterator<Item = &'a mut Parameter>,
) -> Result<()> {
    let tensors = load_named_tensors(path)?;

    for param in params {
        let tensor = tensors.get(&param.name).ok_or_else(|| {
            ModelKitError::ModelLoad(format!(
                "Missing tensor '{}' in {}",
                param.name,
                path.display()
            ))
        })?;
        if tensor.shape() != param.shape() {
            return Err(ModelKitError::WeightShapeMismatch {
                tensor: param.name.clone(),
                expected: param.shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        param.data = tensor.clone();
    }
    Ok(())
}

/// Assign file tensors onto parameters, requiring an exact match.
///
/// Same name and shape rules as [`load_into`], but every tensor in the
/// file must be claimed by a parameter; leftovers are a
/// [`ModelKitError::ModelLoad`] error instead of being ignored.
pub fn load_into_exact<'a>(
    path: &Path,
    params: impl Iterator<Item = &'a mut Parameter>,
) -> Result<()> {
    let mut tensors = load_named_tensors(path)?;

    for param in params {
        let tensor = tensors.remove(&param.name).ok_or_else(|| {
            ModelKitError::ModelLoad(format!(
                "Missing tensor '{}' in {}",
                param.name,
                path.display()
            ))
        })?;
        if tensor.shape() != param.shape() {
            return Err(ModelKitError::WeightShapeMismatch {
                tensor: param.name.clone(),
                expected: param.shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        param.data = tensor;
    }

    if !tensors.is_empty() {
        let mut unclaimed: Vec<String> = tensors.into_keys().collect();
        unclaimed.sort();
        return Err(ModelKitError::ModelLoad(format!(
            "Tensor '{}' in {} matches no parameter",
            unclaimed.join("', '"),
            path.display()
        )));
    }
    Ok(())
}

/// Serialize parameters to a safetensors file.
pub fn save_parameters<'a>(
    path: &Path,
    params: impl Iterator<Item = &'a Parameter>,
) -> Result<()> {
    // Byte buffers must outlive the views handed to the serializer.
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = params
        .map(|param| {
            let bytes: Vec<u8> = param.data.iter().flat_map(|v| v.to_le_bytes()).collect();
            (param.name.clone(), param.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(|e| {
            ModelKitError::ModelLoad(format!("Failed to build tensor view for '{name}': {e}"))
        })?;
        views.push((name.as_str(), view));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    safetensors::serialize_to_file(views, &None, path)
        .map_err(|e| ModelKitError::ModelLoad(format!("Failed to write weights file: {e}")))
}
