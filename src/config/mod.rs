//! Library configuration.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`MODELKIT_*`)
//!
//! Loader internals read the process-wide snapshot from [`global`]; tests
//! and embedding applications construct [`Config`] values directly.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{ModelKitError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model hub configuration
    #[serde(default)]
    pub hub: HubConfig,

    /// Preset cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ModelKitError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| ModelKitError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Hub settings
        if let Ok(url) = std::env::var("MODELKIT_HF_BASE_URL") {
            config.hub.hf_base_url = url;
        }
        if let Ok(url) = std::env::var("MODELKIT_KAGGLE_BASE_URL") {
            config.hub.kaggle_base_url = url;
        }
        if let Ok(secs) = std::env::var("MODELKIT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.hub.timeout_secs = secs;
            }
        }
        if let Ok(offline) = std::env::var("MODELKIT_OFFLINE") {
            config.hub.offline = offline == "1" || offline.eq_ignore_ascii_case("true");
        }

        // Cache settings
        if let Ok(dir) = std::env::var("MODELKIT_CACHE_DIR") {
            config.cache.dir = Some(PathBuf::from(dir));
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let defaults = HubConfig::default();
        Self {
            hub: HubConfig {
                hf_base_url: if other.hub.hf_base_url != defaults.hf_base_url {
                    other.hub.hf_base_url
                } else {
                    self.hub.hf_base_url
                },
                kaggle_base_url: if other.hub.kaggle_base_url != defaults.kaggle_base_url {
                    other.hub.kaggle_base_url
                } else {
                    self.hub.kaggle_base_url
                },
                timeout_secs: if other.hub.timeout_secs != defaults.timeout_secs {
                    other.hub.timeout_secs
                } else {
                    self.hub.timeout_secs
                },
                offline: other.hub.offline || self.hub.offline,
            },
            cache: CacheConfig {
                dir: other.cache.dir.or(self.cache.dir),
            },
        }
    }
}

/// Model hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// HuggingFace Hub base URL
    pub hf_base_url: String,

    /// Kaggle Models base URL
    pub kaggle_base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Fail on cache misses instead of downloading
    pub offline: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hf_base_url: "https://huggingface.co".to_string(),
            kaggle_base_url: "https://www.kaggle.com/api/v1/models".to_string(),
            timeout_secs: 60,
            offline: false,
        }
    }
}

/// Preset cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory for downloaded presets
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: dirs::cache_dir().map(|p| p.join("modelkit")),
        }
    }
}

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Process-wide configuration snapshot.
///
/// Initialized from the environment on first use and immutable afterwards.
pub fn global() -> &'static Config {
    GLOBAL_CONFIG.get_or_init(Config::from_env)
}
