//! Preset identifier parsing.
//!
//! A preset identifier is one of:
//!
//! - a local directory path, e.g. `./checkpoints/my_model`
//! - a HuggingFace Hub handle, e.g. `hf://mistralai/mistral-7b`
//! - a Kaggle Models handle, e.g. `kaggle://keras/mistral/keras/mistral_7b_en`
//! - a built-in preset name from the registry catalog, e.g. `gpt2_base_en`
//!
//! Anything else is a [`ModelKitError::UnknownPreset`] error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelKitError, Result};

/// Scheme of a remote hub handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubScheme {
    /// HuggingFace Hub (`hf://`).
    HuggingFace,
    /// Kaggle Models (`kaggle://`).
    Kaggle,
}

impl HubScheme {
    /// URI prefix, without the `://`.
    pub fn prefix(&self) -> &'static str {
        match self {
            HubScheme::HuggingFace => "hf",
            HubScheme::Kaggle => "kaggle",
        }
    }

    /// Parse a URI prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "hf" => Some(HubScheme::HuggingFace),
            "kaggle" => Some(HubScheme::Kaggle),
            _ => None,
        }
    }
}

/// A `scheme://namespace/name` hub reference.
///
/// The namespace may itself contain slashes; the name is always the final
/// path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubHandle {
    /// Which hub serves the preset.
    pub scheme: HubScheme,
    /// Owner segment(s) of the handle.
    pub namespace: String,
    /// Final path segment.
    pub name: String,
}

impl HubHandle {
    /// Parse a full `scheme://namespace/name` handle.
    pub fn parse(handle: &str) -> Result<Self> {
        let (prefix, rest) = handle
            .split_once("://")
            .ok_or_else(|| ModelKitError::UnknownPreset(handle.to_string()))?;
        let scheme = HubScheme::from_prefix(prefix)
            .ok_or_else(|| ModelKitError::UnknownPreset(handle.to_string()))?;

        let (namespace, name) = rest
            .rsplit_once('/')
            .ok_or_else(|| ModelKitError::UnknownPreset(handle.to_string()))?;
        if namespace.is_empty() || name.is_empty() {
            return Err(ModelKitError::UnknownPreset(handle.to_string()));
        }

        Ok(Self {
            scheme,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// The handle in `scheme://namespace/name` form.
    pub fn uri(&self) -> String {
        format!("{}://{}/{}", self.scheme.prefix(), self.namespace, self.name)
    }
}

/// Where a preset identifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetSource {
    /// A preset directory on the local filesystem.
    Local(PathBuf),
    /// A remote hub handle.
    Hub(HubHandle),
}

impl PresetSource {
    /// Parse a preset identifier.
    ///
    /// Resolution order: an explicit `scheme://` handle, then an existing
    /// local directory, then a built-in name from the registry catalog.
    pub fn parse(preset: &str) -> Result<Self> {
        if preset.is_empty() {
            return Err(ModelKitError::UnknownPreset(preset.to_string()));
        }

        if preset.contains("://") {
            return Ok(PresetSource::Hub(HubHandle::parse(preset)?));
        }

        if Path::new(preset).is_dir() {
            return Ok(PresetSource::Local(PathBuf::from(preset)));
        }

        if let Some(handle) = crate::preset::registry::global().builtin_handle(preset) {
            return Ok(PresetSource::Hub(HubHandle::parse(handle)?));
        }

        Err(ModelKitError::UnknownPreset(preset.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hf_handle() {
        let source = PresetSource::parse("hf://mistralai/mistral-7b").unwrap();
        assert_eq!(
            source,
            PresetSource::Hub(HubHandle {
                scheme: HubScheme::HuggingFace,
                namespace: "mistralai".to_string(),
                name: "mistral-7b".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_kaggle_handle_with_nested_namespace() {
        let source = PresetSource::parse("kaggle://keras/mistral/keras/mistral_7b_en").unwrap();
        match source {
            PresetSource::Hub(handle) => {
                assert_eq!(handle.scheme, HubScheme::Kaggle);
                assert_eq!(handle.namespace, "keras/mistral/keras");
                assert_eq!(handle.name, "mistral_7b_en");
                assert_eq!(handle.uri(), "kaggle://keras/mistral/keras/mistral_7b_en");
            }
            PresetSource::Local(_) => panic!("expected hub source"),
        }
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let err = PresetSource::parse("snaggle://bort/bort/bort").unwrap_err();
        assert!(matches!(err, ModelKitError::UnknownPreset(_)));
        assert!(err
            .to_string()
            .starts_with("Unknown preset identifier: snaggle://bort/bort/bort"));
    }

    #[test]
    fn test_handle_without_name_is_rejected() {
        assert!(PresetSource::parse("hf://justonesegment").is_err());
        assert!(PresetSource::parse("hf:///noname").is_err());
    }

    #[test]
    fn test_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let preset = dir.path().to_str().unwrap();
        let source = PresetSource::parse(preset).unwrap();
        assert_eq!(source, PresetSource::Local(PathBuf::from(preset)));
    }

    #[test]
    fn test_builtin_name_expands_to_handle() {
        let source = PresetSource::parse("gpt2_base_en").unwrap();
        match source {
            PresetSource::Hub(handle) => assert_eq!(handle.scheme, HubScheme::Kaggle),
            PresetSource::Local(_) => panic!("expected hub source"),
        }
    }

    #[test]
    fn test_unknown_bare_name_is_rejected() {
        let err = PresetSource::parse("definitely_not_registered").unwrap_err();
        assert!(matches!(err, ModelKitError::UnknownPreset(_)));
    }
}
