//! Fetches remote mixes into the local cache.
//!
//! Files are staged at `<id>.tmp` and renamed into place on success, so the
//! cache never holds partial downloads under a final name. After analysis a
//! file may be renamed to its title; those renames are recorded in a
//! `file_mappings.txt` sidecar so id-based lookups keep working.

use crate::analyzer::TagReader;
use crate::ids::safe_filename;
use crate::manifest::ManifestEntry;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const MP3_EXTENSION: &str = ".mp3";
const MAPPINGS_FILE: &str = "file_mappings.txt";
const INVALID_ID_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Download failure taxonomy. Downloads are not retried; callers decide
/// whether to requeue.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Source URL is empty")]
    EmptyUrl,
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid entry id: {0:?}")]
    InvalidId(String),
    #[error("Download of {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads remote mixes into a content-addressed cache directory.
pub struct Downloader {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl Downloader {
    pub fn new<P: AsRef<Path>>(cache_dir: P, timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            client,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn is_valid_entry_id(id: &str) -> bool {
        !id.is_empty() && !id.contains(INVALID_ID_CHARS)
    }

    fn mappings_path(&self) -> PathBuf {
        self.cache_dir.join(MAPPINGS_FILE)
    }

    fn lookup_mapping(&self, id: &str) -> Option<PathBuf> {
        let content = fs::read_to_string(self.mappings_path()).ok()?;
        for line in content.lines() {
            if let Some((stored_id, filename)) = line.split_once(':') {
                if stored_id == id {
                    return Some(self.cache_dir.join(filename));
                }
            }
        }
        None
    }

    fn record_mapping(&self, id: &str, filename: &str) -> Result<(), DownloadError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.mappings_path())?;
        writeln!(file, "{}:{}", id, filename)?;
        Ok(())
    }

    /// Expected local path for an entry: the mapped filename when a rename
    /// was recorded, the id-derived name otherwise.
    pub fn local_path(&self, id: &str) -> PathBuf {
        if let Some(mapped) = self.lookup_mapping(id) {
            return mapped;
        }
        self.cache_dir.join(format!("{}{}", id, MP3_EXTENSION))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", id))
    }

    /// True iff the entry's expected local file exists on disk.
    pub fn is_downloaded(&self, id: &str) -> bool {
        if !Self::is_valid_entry_id(id) {
            return false;
        }
        self.local_path(id).exists()
    }

    /// Fetch the entry's source into the cache under its id-derived name.
    /// A no-op returning the existing path when the file is already present.
    pub async fn download(&self, entry: &ManifestEntry) -> Result<PathBuf, DownloadError> {
        if entry.url.is_empty() {
            return Err(DownloadError::EmptyUrl);
        }
        if !Self::is_valid_entry_id(&entry.id) {
            return Err(DownloadError::InvalidId(entry.id.clone()));
        }

        let final_path = self.local_path(&entry.id);
        if self.is_downloaded(&entry.id) {
            return Ok(final_path);
        }

        fs::create_dir_all(&self.cache_dir)?;

        let temp_path = self.temp_path(&entry.id);
        self.fetch_to(&entry.url, &temp_path).await?;
        fs::rename(&temp_path, &final_path)?;

        Ok(final_path)
    }

    /// Download to a staging path, analyze the file, and relocate it to a
    /// title-derived name when the analyzer produced one; the id-derived name
    /// is kept otherwise. Renames are recorded in the mappings sidecar.
    pub async fn download_with_title_naming(
        &self,
        entry: &ManifestEntry,
        analyzer: &dyn TagReader,
    ) -> Result<PathBuf, DownloadError> {
        if entry.url.is_empty() {
            return Err(DownloadError::EmptyUrl);
        }
        if !Self::is_valid_entry_id(&entry.id) {
            return Err(DownloadError::InvalidId(entry.id.clone()));
        }

        if self.is_downloaded(&entry.id) {
            return Ok(self.local_path(&entry.id));
        }

        fs::create_dir_all(&self.cache_dir)?;

        let temp_path = self.temp_path(&entry.id);
        self.fetch_to(&entry.url, &temp_path).await?;

        let tags = analyzer.read_tags(&temp_path).unwrap_or_default();

        let mut final_path = self.cache_dir.join(format!("{}{}", entry.id, MP3_EXTENSION));
        if !tags.title.is_empty() {
            let filename = format!("{}{}", safe_filename(&tags.title), MP3_EXTENSION);
            final_path = self.cache_dir.join(&filename);
            self.record_mapping(&entry.id, &filename)?;
        }

        if temp_path.exists() {
            fs::rename(&temp_path, &final_path)?;
        }

        if !final_path.exists() {
            // Analyzer gave us a name that didn't materialize; locate the
            // file we just wrote instead of losing track of it.
            if let Some(found) = self.newest_cache_file() {
                warn!(
                    "Expected {} missing after rename, using {}",
                    final_path.display(),
                    found.display()
                );
                return Ok(found);
            }
        }

        info!("Downloaded {} to {}", entry.url, final_path.display());
        Ok(final_path)
    }

    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        if let Some(source) = url.strip_prefix("file://") {
            fs::copy(source, dest)?;
            return Ok(());
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let result = self.fetch_http(url, dest).await;
        if result.is_err() && dest.exists() {
            // Never leave a partial file behind.
            let _ = fs::remove_file(dest);
        }
        result
    }

    async fn fetch_http(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::Http {
                url: url.to_string(),
                message: format!("status {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| DownloadError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(())
    }

    fn newest_cache_file(&self) -> Option<PathBuf> {
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for dir_entry in fs::read_dir(&self.cache_dir).ok()? {
            let dir_entry = dir_entry.ok()?;
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
                continue;
            }
            let modified = dir_entry.metadata().ok()?.modified().ok()?;
            if newest.as_ref().map_or(true, |(ts, _)| modified > *ts) {
                newest = Some((modified, path));
            }
        }
        newest.map(|(_, path)| path)
    }
}
