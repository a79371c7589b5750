//! ModelKit error types.
//!
//! Every fallible operation in the crate returns [`Result`], and every
//! failure mode maps onto one [`ModelKitError`] variant. Errors surface at
//! the point of detection: the library never retries and never logs a
//! failure instead of returning it.

use thiserror::Error;

/// ModelKit errors.
#[derive(Error, Debug)]
pub enum ModelKitError {
    /// A component is missing required configuration.
    ///
    /// Raised when a tokenizer is given a vocabulary that lacks a required
    /// special token, or when the model registry is built inconsistently.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An entry point was called in a way that cannot be satisfied.
    ///
    /// The message names the concrete call the caller should make instead.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The preset's declared model family has no registered match.
    #[error("Unsupported preset '{preset}': no registered model family matches '{family}'")]
    UnsupportedPreset {
        /// Preset identifier as given by the caller.
        preset: String,
        /// Backbone family the preset's configuration declares.
        family: String,
    },

    /// A registered family does not support the requested task kind.
    #[error("Model family '{family}' has no registered '{kind}' task")]
    UnsupportedTask {
        /// Backbone family tag.
        family: String,
        /// Requested task kind.
        kind: String,
    },

    /// A serialized tensor disagrees with the declared parameter shape.
    #[error("Weight shape mismatch for '{tensor}': expected {expected:?}, got {actual:?}")]
    WeightShapeMismatch {
        /// Name of the offending tensor.
        tensor: String,
        /// Shape declared by the parameter layout.
        expected: Vec<usize>,
        /// Shape found in the weight file.
        actual: Vec<usize>,
    },

    /// An operation's preconditions do not hold.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The preset identifier matches no scheme, path, or known preset name.
    #[error("Unknown preset identifier: {0}")]
    UnknownPreset(String),

    /// Failed to load model weights or configuration.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Tokenizer error.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration file error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ModelKit operations
pub type Result<T> = std::result::Result<T, ModelKitError>;

impl From<reqwest::Error> for ModelKitError {
    fn from(err: reqwest::Error) -> Self {
        ModelKitError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for ModelKitError {
    fn from(err: toml::de::Error) -> Self {
        ModelKitError::Config(err.to_string())
    }
}
