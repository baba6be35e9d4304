use anyhow::{Context, Result};
use clap::Parser;
use mixdeck::analyzer::Id3TagReader;
use mixdeck::config::{AppConfig, CliConfig, FileConfig};
use mixdeck::{Downloader, MixEngine, MixStore, NullPlayer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Directory for downloaded mix files. Defaults next to the database.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// URL or local path of the mix manifest to sync and download.
    #[clap(long)]
    pub manifest_url: Option<String>,

    /// Timeout in seconds for individual file downloads.
    #[clap(long, default_value_t = 300)]
    pub download_timeout_secs: u64,

    /// Maximum number of concurrent background downloads.
    #[clap(long, default_value_t = 4)]
    pub max_concurrent_downloads: usize,

    /// Path to a TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;

    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        cache_dir: cli_args.cache_dir,
        manifest_url: cli_args.manifest_url,
        download_timeout_secs: cli_args.download_timeout_secs,
        max_concurrent_downloads: cli_args.max_concurrent_downloads,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    std::fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("Cannot create cache directory {:?}", config.cache_dir))?;

    info!("Opening mix catalog at {:?}...", config.db_path);
    let store = MixStore::open(&config.db_path)?;
    let downloader = Downloader::new(&config.cache_dir, config.download_timeout)?;

    let engine = MixEngine::new(
        store,
        downloader,
        Arc::new(Id3TagReader),
        Arc::new(NullPlayer::new()),
        config.engine.clone(),
    )?;

    info!("Reconciling cache and catalog...");
    engine.run_maintenance()?;

    let Some(manifest_url) = config.manifest_url else {
        info!(
            "No manifest configured; catalog has {} entries, cache holds {} bytes",
            engine.all_entries()?.len(),
            engine.cache_size()
        );
        return Ok(());
    };

    info!("Syncing manifest from {}...", manifest_url);
    let new_count = engine.sync_remote_metadata(&manifest_url).await?;
    info!("{} new mixes available", new_count);

    let launched = engine.download_available_in_background();
    if launched > 0 {
        info!("Downloading {} mixes in the background...", launched);
        while engine.pending_downloads() > 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            engine.reap_completed();
        }
    }

    info!(
        "Done: catalog has {} entries, cache holds {} bytes",
        engine.all_entries()?.len(),
        engine.cache_size()
    );
    Ok(())
}
