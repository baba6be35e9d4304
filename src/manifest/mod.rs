//! Remote mix manifest: fetching and parsing.
//!
//! The manifest is a JSON document with a top-level `mixes` array. Each
//! record is either a bare source URL or an object with optional descriptive
//! fields; authoritative metadata comes from analyzing the downloaded file,
//! so everything except the URL is advisory. Records without a URL are
//! skipped.

use crate::ids::{entry_id_from_url, filename_from_url};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// One record from the manifest, normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub duration_seconds: i64,
    pub description: String,
    pub tags: Vec<String>,
    /// Filename component of the URL, percent-decoded.
    pub original_filename: String,
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    mixes: Vec<RawEntry>,
}

/// A record is either a bare URL string or a full object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Url(String),
    Record {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        artist: Option<String>,
        #[serde(default)]
        genre: Option<String>,
        #[serde(default)]
        duration_seconds: Option<i64>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        tags: Option<Vec<String>>,
    },
}

impl RawEntry {
    fn normalize(self) -> Option<ManifestEntry> {
        match self {
            RawEntry::Url(url) => {
                if url.is_empty() {
                    return None;
                }
                Some(ManifestEntry {
                    id: entry_id_from_url(&url),
                    original_filename: filename_from_url(&url),
                    url,
                    ..Default::default()
                })
            }
            RawEntry::Record {
                id,
                url,
                title,
                artist,
                genre,
                duration_seconds,
                description,
                tags,
            } => {
                let url = url.filter(|u| !u.is_empty())?;
                let id = id
                    .filter(|i| !i.is_empty())
                    .unwrap_or_else(|| entry_id_from_url(&url));
                Some(ManifestEntry {
                    id,
                    original_filename: filename_from_url(&url),
                    url,
                    title: title.unwrap_or_default(),
                    artist: artist.unwrap_or_default(),
                    genre: genre.unwrap_or_default(),
                    duration_seconds: duration_seconds.unwrap_or_default(),
                    description: description.unwrap_or_default(),
                    tags: tags.unwrap_or_default(),
                })
            }
        }
    }
}

/// Parse a manifest document, skipping invalid records.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    if text.trim().is_empty() {
        bail!("Manifest document is empty");
    }

    let document: ManifestDocument =
        serde_json::from_str(text).context("Failed to parse manifest document")?;

    let total = document.mixes.len();
    let entries: Vec<ManifestEntry> = document
        .mixes
        .into_iter()
        .filter_map(RawEntry::normalize)
        .collect();

    let skipped = total - entries.len();
    if skipped > 0 {
        warn!("Skipped {} manifest records without a source URL", skipped);
    }

    Ok(entries)
}

/// Retry schedule for manifest fetches: fixed attempt count with exponential
/// backoff between attempts.
#[derive(Debug, Clone)]
pub struct SyncRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
}

impl Default for SyncRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2,
        }
    }
}

impl SyncRetry {
    /// Backoff before retry number `attempt` (zero-based): 1s, 2s, 4s with
    /// the defaults.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * self.backoff_multiplier.pow(attempt)
    }
}

/// Fetches manifest documents over HTTP or from the local filesystem.
pub struct ManifestClient {
    client: reqwest::Client,
    retry: SyncRetry,
}

impl ManifestClient {
    pub fn new(timeout: Duration, retry: SyncRetry) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, retry })
    }

    /// Load and parse the manifest from a URL or local path, one attempt.
    pub async fn load(&self, source: &str) -> Result<Vec<ManifestEntry>> {
        let text = if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_remote(source).await?
        } else {
            let path = source.strip_prefix("file://").unwrap_or(source);
            read_local(Path::new(path)).await?
        };
        parse_manifest(&text)
    }

    /// Load with the configured retry schedule; reports the last error after
    /// the final attempt.
    pub async fn load_with_retry(&self, source: &str) -> Result<Vec<ManifestEntry>> {
        let mut last_error = None;
        for attempt in 0..self.retry.max_attempts {
            match self.load(source).await {
                Ok(entries) => return Ok(entries),
                Err(e) => {
                    debug!(
                        "Manifest fetch attempt {}/{} failed: {:#}",
                        attempt + 1,
                        self.retry.max_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Manifest fetch failed without attempts")))
    }

    async fn fetch_remote(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch manifest")?;

        if !response.status().is_success() {
            bail!("Manifest fetch failed with status: {}", response.status());
        }

        response.text().await.context("Failed to read manifest body")
    }
}

async fn read_local(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot open manifest file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_records() {
        let text = r#"{
            "mixes": [
                {
                    "id": "mix-1",
                    "url": "https://cdn.example.com/one.mp3",
                    "title": "One",
                    "artist": "DJ A",
                    "genre": "Techno",
                    "duration_seconds": 3600,
                    "description": "opener",
                    "tags": ["live"]
                }
            ]
        }"#;
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, "mix-1");
        assert_eq!(entry.title, "One");
        assert_eq!(entry.genre, "Techno");
        assert_eq!(entry.duration_seconds, 3600);
        assert_eq!(entry.tags, vec!["live".to_string()]);
        assert_eq!(entry.original_filename, "one.mp3");
    }

    #[test]
    fn test_parse_bare_url_records() {
        let text = r#"{"mixes": ["https://cdn.example.com/sets/late%20night.mp3"]}"#;
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.url, "https://cdn.example.com/sets/late%20night.mp3");
        assert_eq!(entry.id, entry_id_from_url(&entry.url));
        assert_eq!(entry.original_filename, "late night.mp3");
        assert!(entry.title.is_empty());
    }

    #[test]
    fn test_records_without_url_are_skipped() {
        let text = r#"{
            "mixes": [
                {"title": "no url here"},
                {"url": "", "title": "empty url"},
                {"url": "https://cdn.example.com/keep.mp3"}
            ]
        }"#;
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://cdn.example.com/keep.mp3");
    }

    #[test]
    fn test_id_derived_when_absent() {
        let text = r#"{"mixes": [{"url": "https://cdn.example.com/a.mp3"}]}"#;
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries[0].id, entry_id_from_url("https://cdn.example.com/a.mp3"));
    }

    #[test]
    fn test_missing_mixes_section_is_an_error() {
        assert!(parse_manifest(r#"{"tracks": []}"#).is_err());
        assert!(parse_manifest("").is_err());
        assert!(parse_manifest("not json").is_err());
    }

    #[test]
    fn test_backoff_schedule() {
        let retry = SyncRetry::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff(0), Duration::from_secs(1));
        assert_eq!(retry.backoff(1), Duration::from_secs(2));
        assert_eq!(retry.backoff(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_load_from_local_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mixes.json");
        std::fs::write(&path, r#"{"mixes": ["https://cdn.example.com/a.mp3"]}"#).unwrap();

        let client = ManifestClient::new(Duration::from_secs(5), SyncRetry::default()).unwrap();
        let entries = client.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_local_file_fails() {
        let client = ManifestClient::new(Duration::from_secs(5), SyncRetry::default()).unwrap();
        assert!(client.load("/nonexistent/mixes.json").await.is_err());
    }
}
