use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub cache_dir: Option<String>,
    pub manifest_url: Option<String>,
    pub download_timeout_secs: Option<u64>,
    pub max_concurrent_downloads: Option<usize>,

    // Feature configs
    pub selector: Option<SelectorFileConfig>,
    pub crossfade: Option<CrossfadeFileConfig>,
    pub sync: Option<SyncFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SelectorFileConfig {
    pub preferred_genre_probability: Option<u32>,
    pub favorite_probability: Option<u32>,
    pub prefer_unplayed: Option<bool>,
    pub prefer_least_played: Option<bool>,
    /// Fixed RNG seed for reproducible selection.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CrossfadeFileConfig {
    pub enabled: Option<bool>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncFileConfig {
    pub manifest_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
