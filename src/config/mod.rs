mod file_config;

pub use file_config::{CrossfadeFileConfig, FileConfig, SelectorFileConfig, SyncFileConfig};

use crate::catalog::SelectorConfig;
use crate::engine::EngineSettings;
use crate::manifest::SyncRetry;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that participate in config resolution. This struct mirrors
/// the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub manifest_url: Option<String>,
    pub download_timeout_secs: u64,
    pub max_concurrent_downloads: usize,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub manifest_url: Option<String>,
    pub download_timeout: Duration,
    pub engine: EngineSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(|| {
                db_path
                    .parent()
                    .map(|p| p.join("mix_cache"))
                    .unwrap_or_else(|| PathBuf::from("mix_cache"))
            });

        let manifest_url = file.manifest_url.or_else(|| cli.manifest_url.clone());

        let download_timeout_secs = file
            .download_timeout_secs
            .unwrap_or(cli.download_timeout_secs);
        let max_concurrent_downloads = file
            .max_concurrent_downloads
            .unwrap_or(cli.max_concurrent_downloads)
            .max(1);

        // Selector settings - merge file config with defaults
        let sel_file = file.selector.unwrap_or_default();
        let selector_defaults = SelectorConfig::default();
        let selector = SelectorConfig {
            preferred_genre_probability: sel_file
                .preferred_genre_probability
                .unwrap_or(selector_defaults.preferred_genre_probability)
                .min(100),
            favorite_probability: sel_file
                .favorite_probability
                .unwrap_or(selector_defaults.favorite_probability)
                .min(100),
            prefer_unplayed: sel_file
                .prefer_unplayed
                .unwrap_or(selector_defaults.prefer_unplayed),
            prefer_least_played: sel_file
                .prefer_least_played
                .unwrap_or(selector_defaults.prefer_least_played),
        };

        let fade_file = file.crossfade.unwrap_or_default();
        let engine_defaults = EngineSettings::default();

        let sync_file = file.sync.unwrap_or_default();
        let retry_defaults = SyncRetry::default();
        let sync_retry = SyncRetry {
            max_attempts: sync_file.max_attempts.unwrap_or(retry_defaults.max_attempts).max(1),
            initial_backoff: sync_file
                .initial_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(retry_defaults.initial_backoff),
            backoff_multiplier: retry_defaults.backoff_multiplier,
        };

        let engine = EngineSettings {
            selector,
            selector_seed: sel_file.seed,
            crossfade_enabled: fade_file.enabled.unwrap_or(engine_defaults.crossfade_enabled),
            crossfade_duration: fade_file
                .duration_ms
                .map(Duration::from_millis)
                .unwrap_or(engine_defaults.crossfade_duration),
            manifest_timeout: sync_file
                .manifest_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(engine_defaults.manifest_timeout),
            sync_retry,
            max_concurrent_downloads,
        };

        Ok(Self {
            db_path,
            cache_dir,
            manifest_url,
            download_timeout: Duration::from_secs(download_timeout_secs),
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> CliConfig {
        CliConfig {
            db_path: Some(PathBuf::from("/tmp/mixes.db")),
            cache_dir: None,
            manifest_url: None,
            download_timeout_secs: 300,
            max_concurrent_downloads: 4,
        }
    }

    #[test]
    fn test_resolve_from_cli_only() {
        let config = AppConfig::resolve(&base_cli(), None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/mixes.db"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/mix_cache"));
        assert_eq!(config.download_timeout, Duration::from_secs(300));
        assert!(config.engine.crossfade_enabled);
        assert_eq!(config.engine.selector.preferred_genre_probability, 80);
        assert_eq!(config.engine.selector.favorite_probability, 70);
    }

    #[test]
    fn test_db_path_is_required() {
        let cli = CliConfig {
            db_path: None,
            ..base_cli()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_toml_overrides_cli() {
        let file: FileConfig = toml::from_str(
            r#"
            db_path = "/tmp/other.db"
            download_timeout_secs = 60

            [selector]
            preferred_genre_probability = 100
            favorite_probability = 0
            seed = 7

            [crossfade]
            enabled = false
            duration_ms = 1500

            [sync]
            max_attempts = 5
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&base_cli(), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.download_timeout, Duration::from_secs(60));
        assert_eq!(config.engine.selector.preferred_genre_probability, 100);
        assert_eq!(config.engine.selector.favorite_probability, 0);
        assert_eq!(config.engine.selector_seed, Some(7));
        assert!(!config.engine.crossfade_enabled);
        assert_eq!(config.engine.crossfade_duration, Duration::from_millis(1500));
        assert_eq!(config.engine.sync_retry.max_attempts, 5);
    }

    #[test]
    fn test_probabilities_clamped_to_percent() {
        let file: FileConfig = toml::from_str(
            r#"
            [selector]
            preferred_genre_probability = 250
            "#,
        )
        .unwrap();
        let config = AppConfig::resolve(&base_cli(), Some(file)).unwrap();
        assert_eq!(config.engine.selector.preferred_genre_probability, 100);
    }

    #[test]
    fn test_missing_db_parent_rejected() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent-dir-xyz/mixes.db")),
            ..base_cli()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }
}
