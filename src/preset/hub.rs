//! Remote preset fetching.
//!
//! Hub handles are materialized into the local preset cache before anything
//! is loaded from them. Downloads are blocking and unretried; a cached
//! preset is never re-fetched. The fetch itself sits behind [`HubFetcher`]
//! so tests can materialize presets without a network.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ModelKitError, Result};
use crate::preset::identifier::{HubHandle, HubScheme};

/// Every file a preset may carry, in fetch order.
const PRESET_FILES: &[&str] = &[
    crate::preset::CONFIG_FILE,
    crate::preset::MODEL_WEIGHTS_FILE,
    crate::preset::TASK_CONFIG_FILE,
    crate::preset::TASK_WEIGHTS_FILE,
    crate::preset::PREPROCESSOR_CONFIG_FILE,
    crate::preset::TOKENIZER_CONFIG_FILE,
    crate::preset::TOKENIZER_ASSET,
];

/// Downloads individual preset files.
pub trait HubFetcher {
    /// Fetch `file` from `handle` into `dest`.
    ///
    /// Returns `Ok(false)` when the remote reports the file absent, which
    /// is normal for optional files like task configs.
    fn fetch_file(&self, handle: &HubHandle, file: &str, dest: &Path) -> Result<bool>;
}

/// Blocking HTTP fetcher for the supported hubs.
pub struct HttpHubFetcher {
    client: reqwest::blocking::Client,
    hf_base_url: String,
    kaggle_base_url: String,
}

impl HttpHubFetcher {
    /// Build a fetcher from hub configuration.
    pub fn new(config: &crate::config::HubConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelKitError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            hf_base_url: config.hf_base_url.clone(),
            kaggle_base_url: config.kaggle_base_url.clone(),
        })
    }

    pub(crate) fn file_url(&self, handle: &HubHandle, file: &str) -> String {
        match handle.scheme {
            HubScheme::HuggingFace => format!(
                "{}/{}/{}/resolve/main/{file}",
                self.hf_base_url, handle.namespace, handle.name
            ),
            HubScheme::Kaggle => format!(
                "{}/{}/{}/download/{file}",
                self.kaggle_base_url, handle.namespace, handle.name
            ),
        }
    }
}

impl HubFetcher for HttpHubFetcher {
    fn fetch_file(&self, handle: &HubHandle, file: &str, dest: &Path) -> Result<bool> {
        let url = self.file_url(handle, file);
        debug!(url = %url, "Fetching preset file");

        let response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(ModelKitError::Network(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let bytes = response.bytes()?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)?;
        Ok(true)
    }
}

/// Cache directory for a hub handle.
pub fn cache_dir(handle: &HubHandle, config: &Config) -> Result<PathBuf> {
    let root = config.cache.dir.clone().ok_or_else(|| {
        ModelKitError::Config(
            "No cache directory available; set cache.dir or MODELKIT_CACHE_DIR".to_string(),
        )
    })?;
    Ok(root
        .join("presets")
        .join(handle.scheme.prefix())
        .join(&handle.namespace)
        .join(&handle.name))
}

/// Ensure a hub preset exists in the local cache, downloading on a miss.
///
/// The preset counts as cached once its `config.json` is present. Downloads
/// land in a staging directory first, so an interrupted fetch never reads as
/// cached and is retried on the next call.
pub fn materialize(handle: &HubHandle, config: &Config) -> Result<PathBuf> {
    let dir = cache_dir(handle, config)?;

    if dir.join(crate::preset::CONFIG_FILE).exists() {
        debug!(path = %dir.display(), "Preset cache hit");
        return Ok(dir);
    }

    if config.hub.offline {
        return Err(ModelKitError::Network(format!(
            "Preset '{}' is not cached and offline mode is set",
            handle.uri()
        )));
    }

    let fetcher = HttpHubFetcher::new(&config.hub)?;
    materialize_with(&fetcher, handle, &dir)?;
    Ok(dir)
}

/// Download a preset through `fetcher` into `dir`.
///
/// Files are staged in a sibling directory and renamed into place only
/// after every fetch succeeds; a failed download leaves no trace of `dir`.
pub fn materialize_with(fetcher: &dyn HubFetcher, handle: &HubHandle, dir: &Path) -> Result<()> {
    info!(handle = %handle.uri(), "Downloading preset");

    let staging = staging_dir(dir);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }

    if let Err(err) = fetch_preset(fetcher, handle, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }

    // A directory without config.json is a leftover, never a cache entry.
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::rename(&staging, dir)?;
    Ok(())
}

fn staging_dir(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Download every preset file through the fetcher.
///
/// `config.json` is the only file a preset cannot exist without; the rest
/// are optional and misses are only logged.
pub fn fetch_preset(fetcher: &dyn HubFetcher, handle: &HubHandle, dir: &Path) -> Result<()> {
    for file in PRESET_FILES {
        let found = fetcher.fetch_file(handle, file, &dir.join(file))?;
        if !found {
            if *file == crate::preset::CONFIG_FILE {
                return Err(ModelKitError::ModelLoad(format!(
                    "Preset '{}' has no {file}",
                    handle.uri()
                )));
            }
            warn!(file = file, "Optional preset file not available");
        }
    }
    Ok(())
}
