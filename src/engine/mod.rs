//! Engine orchestration: manifest sync, background downloads, playback
//! commands, and the crossfade driver.
//!
//! The engine owns the persisted store and the transient list of
//! available-but-undownloaded entries. Nothing reaches the store until its
//! file has been downloaded and analyzed, so the catalog never contains
//! entries that cannot be played.

pub mod crossfade;
pub mod maintenance;
pub mod tasks;

use crate::analyzer::TagReader;
use crate::catalog::{MixEntry, MixStore, SelectorConfig, SmartSelector};
use crate::downloader::Downloader;
use crate::manifest::{ManifestClient, ManifestEntry, SyncRetry};
use crate::player::Player;
use anyhow::{bail, Context, Result};
use crossfade::{Crossfade, CrossfadeTick, DEFAULT_CROSSFADE_MS};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tasks::DownloadPool;
use tracing::{info, warn};

/// Callback fired when the very first entry lands in an empty catalog.
pub type FirstEntryCallback = Box<dyn FnOnce(&MixEntry) + Send>;

/// Engine tuning, resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub selector: SelectorConfig,
    /// Fixed RNG seed for reproducible selection; entropy-seeded when None.
    pub selector_seed: Option<u64>,
    pub crossfade_enabled: bool,
    pub crossfade_duration: Duration,
    pub manifest_timeout: Duration,
    pub sync_retry: SyncRetry,
    pub max_concurrent_downloads: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            selector_seed: None,
            crossfade_enabled: true,
            crossfade_duration: Duration::from_millis(DEFAULT_CROSSFADE_MS),
            manifest_timeout: Duration::from_secs(30),
            sync_retry: SyncRetry::default(),
            max_concurrent_downloads: 4,
        }
    }
}

pub struct MixEngine {
    store: MixStore,
    selector: SmartSelector,
    downloader: Arc<Downloader>,
    analyzer: Arc<dyn TagReader>,
    player: Arc<dyn Player>,
    manifest: ManifestClient,
    pool: DownloadPool,
    settings: EngineSettings,
    /// Known-from-manifest entries not yet downloaded; rebuilt on every sync.
    available: Mutex<Vec<ManifestEntry>>,
    current: Mutex<Option<MixEntry>>,
    current_genre: Mutex<String>,
    crossfade: Mutex<Crossfade>,
    on_first_entry: Mutex<Option<FirstEntryCallback>>,
}

impl MixEngine {
    pub fn new(
        store: MixStore,
        downloader: Downloader,
        analyzer: Arc<dyn TagReader>,
        player: Arc<dyn Player>,
        settings: EngineSettings,
    ) -> Result<Arc<Self>> {
        let selector = match settings.selector_seed {
            Some(seed) => SmartSelector::with_seed(store.clone(), settings.selector.clone(), seed),
            None => SmartSelector::new(store.clone(), settings.selector.clone()),
        };
        let manifest = ManifestClient::new(settings.manifest_timeout, settings.sync_retry.clone())?;
        let pool = DownloadPool::new(settings.max_concurrent_downloads);

        Ok(Arc::new(Self {
            store,
            selector,
            downloader: Arc::new(downloader),
            analyzer,
            player,
            manifest,
            pool,
            settings,
            available: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            current_genre: Mutex::new(String::new()),
            crossfade: Mutex::new(Crossfade::new()),
            on_first_entry: Mutex::new(None),
        }))
    }

    pub fn store(&self) -> &MixStore {
        &self.store
    }

    /// Register the one-shot callback fired when the first entry ever is
    /// persisted. Used by callers to auto-start playback.
    pub fn set_on_first_entry(&self, callback: FirstEntryCallback) {
        *self.on_first_entry.lock().unwrap() = Some(callback);
    }

    // =========================================================================
    // Manifest sync and downloads
    // =========================================================================

    /// Fetch the manifest (with retry), diff against the store, and rebuild
    /// the in-memory available list from the entries the catalog does not
    /// know yet. Nothing is written to the store here. Returns how many new
    /// entries were found.
    pub async fn sync_remote_metadata(&self, source: &str) -> Result<usize> {
        let entries = self
            .manifest
            .load_with_retry(source)
            .await
            .context("Failed to load remote metadata")?;

        let known_ids: HashSet<String> = self
            .store
            .all_rows()?
            .into_iter()
            .map(|e| e.id)
            .collect();

        let new_entries: Vec<ManifestEntry> = entries
            .into_iter()
            .filter(|e| !known_ids.contains(&e.id))
            .collect();

        let count = new_entries.len();
        if count > 0 {
            info!("Found {} new mixes in manifest", count);
        }
        *self.available.lock().unwrap() = new_entries;
        Ok(count)
    }

    /// The current available-but-undownloaded list.
    pub fn available_entries(&self) -> Vec<ManifestEntry> {
        self.available.lock().unwrap().clone()
    }

    /// Download an entry, extract its authoritative metadata, and persist the
    /// validated record. A no-op when the id is already in the store, which
    /// makes re-downloads idempotent.
    pub async fn download_and_analyze(&self, entry: &ManifestEntry) -> Result<()> {
        if self.store.get_by_id(&entry.id)?.is_some() {
            info!("Entry {} already in catalog, skipping download", entry.id);
            return Ok(());
        }

        let local_path = self
            .downloader
            .download_with_title_naming(entry, self.analyzer.as_ref())
            .await
            .with_context(|| format!("Failed to download {}", entry.url))?;

        let tags = self
            .analyzer
            .read_tags(&local_path)
            .with_context(|| format!("Failed to analyze {}", local_path.display()))?;
        if tags.is_empty() {
            bail!("Analysis produced no usable metadata for {}", local_path.display());
        }

        let was_empty = self.store.count_all()? == 0;

        let record = MixEntry {
            id: entry.id.clone(),
            title: tags.title,
            artist: tags.artist,
            genre: tags.genre,
            url: entry.url.clone(),
            local_path: Some(local_path.display().to_string()),
            duration_seconds: tags.duration_seconds,
            tags: tags.tags,
            description: tags.description,
            ..Default::default()
        };

        self.store.add(&record)?;
        info!("Added mix to catalog: {} - {}", record.artist, record.title);

        if was_empty {
            if let Some(callback) = self.on_first_entry.lock().unwrap().take() {
                callback(&record);
            }
        }

        Ok(())
    }

    /// Launch `download_and_analyze` on the background pool. Returns false
    /// when a download for this id is already in flight.
    pub fn download_in_background(self: &Arc<Self>, entry: ManifestEntry) -> bool {
        let engine = Arc::clone(self);
        let id = entry.id.clone();
        self.pool.spawn(id, async move {
            if let Err(e) = engine.download_and_analyze(&entry).await {
                warn!("Background download failed for {}: {:#}", entry.url, e);
            }
        })
    }

    /// Start background downloads for everything in the available list.
    /// Returns the number of downloads launched.
    pub fn download_available_in_background(self: &Arc<Self>) -> usize {
        let entries = self.available_entries();
        entries
            .into_iter()
            .filter(|entry| self.download_in_background(entry.clone()))
            .count()
    }

    /// Prune finished background download handles. Must be called
    /// periodically; the pool never reaps on its own.
    pub fn reap_completed(&self) -> usize {
        self.pool.reap()
    }

    /// Number of retained background handles, finished or not.
    pub fn pending_downloads(&self) -> usize {
        self.pool.handle_count()
    }

    /// Wait until every launched download has finished.
    pub async fn wait_for_downloads(&self) {
        self.pool.drain().await;
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Play a downloaded entry. Rejects entries whose local file is missing
    /// or fails the container validity check; a failing file is deleted and
    /// the current entry is left unchanged.
    pub fn play(&self, entry: &MixEntry) -> Result<()> {
        if !self.downloader.is_downloaded(&entry.id) {
            bail!("Mix not downloaded: {}", entry.title);
        }
        let local_path = self.downloader.local_path(&entry.id);

        if !self.player.is_valid_file(&local_path) {
            warn!("Corrupted file detected: {}", local_path.display());
            if let Err(e) = std::fs::remove_file(&local_path) {
                warn!("Failed to remove corrupted file: {}", e);
            }
            bail!("Mix file is corrupted or invalid: {}", entry.title);
        }

        if !self.player.play(&local_path) {
            bail!("Player failed to start: {}", entry.title);
        }

        // Stats failures are drift, not playback failures.
        if let Err(e) = self.store.update_play_stats(&entry.id) {
            warn!("Failed to update play stats for {}: {:#}", entry.id, e);
        }
        if let Err(e) = self
            .store
            .set_local_path(&entry.id, &local_path.display().to_string())
        {
            warn!("Failed to record local path for {}: {:#}", entry.id, e);
        }

        *self.current.lock().unwrap() = Some(entry.clone());
        Ok(())
    }

    /// Play with a crossfade when one applies: player already playing,
    /// crossfades enabled, and none active.
    pub fn play_entry(&self, entry: &MixEntry) -> Result<()> {
        let fade_applies = self.settings.crossfade_enabled
            && self.player.is_playing()
            && !self.crossfade.lock().unwrap().is_active();
        if fade_applies {
            self.start_crossfade(entry, self.settings.crossfade_duration)
        } else {
            self.play(entry)
        }
    }

    /// Smart-select the next entry (excluding the current one, honoring the
    /// current genre preference) and play it.
    pub fn play_smart(&self) -> Result<Option<MixEntry>> {
        let exclude = self.current_id();
        let genre = self.current_genre();
        let Some(entry) = self.selector.select_smart(&exclude, &genre)? else {
            return Ok(None);
        };
        self.play_entry(&entry)?;
        Ok(Some(entry))
    }

    /// Entry after the current one in id order, wrapping around.
    pub fn next_entry(&self) -> Result<Option<MixEntry>> {
        self.selector.next(&self.current_id())
    }

    /// Entry before the current one in id order, wrapping around.
    pub fn previous_entry(&self) -> Result<Option<MixEntry>> {
        self.selector.previous(&self.current_id())
    }

    pub fn select_smart(&self, exclude_id: &str, preferred_genre: &str) -> Result<Option<MixEntry>> {
        self.selector.select_smart(exclude_id, preferred_genre)
    }

    pub fn select_random(&self) -> Result<Option<MixEntry>> {
        self.selector.select_random(&self.current_id())
    }

    pub fn select_random_by_genre(&self, genre: &str) -> Result<Option<MixEntry>> {
        self.selector.select_random_by_genre(genre, &self.current_id())
    }

    pub fn select_random_by_artist(&self, artist: &str) -> Result<Option<MixEntry>> {
        self.selector.select_random_by_artist(artist, &self.current_id())
    }

    pub fn current_entry(&self) -> Option<MixEntry> {
        self.current.lock().unwrap().clone()
    }

    fn current_id(&self) -> String {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|e| e.id.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Crossfade
    // =========================================================================

    /// Begin a crossfade into `entry`. The new entry starts at volume zero
    /// and becomes the current entry immediately; `tick` ramps it up to the
    /// pre-fade volume.
    pub fn start_crossfade(&self, entry: &MixEntry, duration: Duration) -> Result<()> {
        let target_volume = self.player.volume();

        self.play(entry)?;
        self.player.set_volume(0, true);

        self.crossfade
            .lock()
            .unwrap()
            .start(Instant::now(), duration, target_volume);
        Ok(())
    }

    /// Advance the crossfade; call once per external update cycle.
    pub fn tick(&self, now: Instant) {
        let tick = self.crossfade.lock().unwrap().tick(now);
        match tick {
            CrossfadeTick::Idle => {}
            CrossfadeTick::Ramp { volume } | CrossfadeTick::Finished { volume } => {
                self.player.set_volume(volume, true);
            }
        }
    }

    pub fn crossfade_active(&self) -> bool {
        self.crossfade.lock().unwrap().is_active()
    }

    // =========================================================================
    // Catalog passthroughs
    // =========================================================================

    pub fn get_by_id(&self, id: &str) -> Result<Option<MixEntry>> {
        self.store.get_by_id(id)
    }

    pub fn all_entries(&self) -> Result<Vec<MixEntry>> {
        self.store.get_all()
    }

    pub fn downloaded_entries(&self) -> Result<Vec<MixEntry>> {
        self.store.get_downloaded()
    }

    pub fn favorite_entries(&self) -> Result<Vec<MixEntry>> {
        self.store.get_favorites()
    }

    pub fn recently_played(&self, limit: i64) -> Result<Vec<MixEntry>> {
        self.store.get_recently_played(limit)
    }

    pub fn toggle_favorite(&self, id: &str) -> Result<()> {
        self.store.toggle_favorite(id)
    }

    pub fn soft_delete(&self, id: &str) -> Result<()> {
        self.store.soft_delete(id)
    }

    // =========================================================================
    // Genre tracking
    // =========================================================================

    pub fn available_genres(&self) -> Result<Vec<String>> {
        self.store.distinct_genres()
    }

    pub fn current_genre(&self) -> String {
        self.current_genre.lock().unwrap().clone()
    }

    /// Set the genre preference, matching catalog casing case-insensitively
    /// when the genre is known.
    pub fn set_current_genre(&self, genre: &str) {
        let resolved = self
            .store
            .distinct_genres()
            .ok()
            .and_then(|genres| {
                genres
                    .into_iter()
                    .find(|g| g.eq_ignore_ascii_case(genre))
            })
            .unwrap_or_else(|| genre.to_string());
        *self.current_genre.lock().unwrap() = resolved;
    }

    /// Advance to the next known genre, wrapping around the list.
    pub fn next_genre(&self) -> Result<Option<String>> {
        let genres = self.store.distinct_genres()?;
        if genres.is_empty() {
            return Ok(None);
        }

        let mut current = self.current_genre.lock().unwrap();
        let next = match genres.iter().position(|g| *g == *current) {
            Some(pos) => genres[(pos + 1) % genres.len()].clone(),
            None => genres[0].clone(),
        };
        *current = next.clone();
        Ok(Some(next))
    }

    /// Jump to a uniformly random known genre.
    pub fn random_genre(&self) -> Result<Option<String>> {
        let genres = self.store.distinct_genres()?;
        if genres.is_empty() {
            return Ok(None);
        }
        let picked = genres[self.selector.random_index(genres.len())].clone();
        *self.current_genre.lock().unwrap() = picked.clone();
        Ok(Some(picked))
    }

    // =========================================================================
    // Player passthroughs
    // =========================================================================

    pub fn toggle_pause(&self) -> bool {
        self.player.toggle_pause()
    }

    pub fn stop(&self) -> bool {
        self.player.stop()
    }

    pub fn set_volume(&self, level: i32) -> bool {
        self.player.set_volume(level, false)
    }

    pub fn volume(&self) -> i32 {
        self.player.volume()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.player.is_paused()
    }

    pub fn has_finished(&self) -> bool {
        self.player.has_finished()
    }

    pub fn position_seconds(&self) -> i64 {
        self.player.position_seconds()
    }

    // =========================================================================
    // Cache management and maintenance
    // =========================================================================

    pub fn cache_dir(&self) -> &Path {
        self.downloader.cache_dir()
    }

    /// Total bytes of every file in the cache directory.
    pub fn cache_size(&self) -> u64 {
        let mut total = 0;
        for entry in walkdir::WalkDir::new(self.cache_dir())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        total
    }

    /// Remove every cached file and recreate the directory.
    pub fn clear_cache(&self) -> Result<()> {
        let dir = self.cache_dir();
        if dir.exists() {
            std::fs::remove_dir_all(dir).context("Failed to clear cache")?;
        }
        std::fs::create_dir_all(dir).context("Failed to recreate cache directory")?;
        info!("Cache cleared");
        Ok(())
    }

    /// Run the full reconciliation pass: drop corrupt cache files, drop rows
    /// for vanished files, and migrate rows with stale ids.
    pub fn run_maintenance(&self) -> Result<()> {
        maintenance::cleanup_corrupted_local_files(self.cache_dir())?;
        maintenance::cleanup_missing_files(&self.store)?;
        maintenance::cleanup_inconsistent_ids(&self.store)?;
        Ok(())
    }
}
