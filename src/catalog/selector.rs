//! Weighted smart selection over the catalog.
//!
//! Picks the next mix to play with a three-tier strategy: preferred genre,
//! then favorites, then anything downloaded, always falling back to the whole
//! catalog rather than returning nothing while entries exist. The RNG is
//! owned and seedable so selection is deterministic under test.

use super::models::{MixEntry, SelectionCriteria};
use super::query::OrderBy;
use super::store::MixStore;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Tuning knobs for smart selection.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Percentage chance to favor the preferred genre when matches exist.
    pub preferred_genre_probability: u32,
    /// Percentage chance to favor favorites when the genre tier was not taken.
    pub favorite_probability: u32,
    /// Put never-played entries first.
    pub prefer_unplayed: bool,
    /// Then oldest last-played and fewest plays.
    pub prefer_least_played: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            preferred_genre_probability: 80,
            favorite_probability: 70,
            prefer_unplayed: true,
            prefer_least_played: true,
        }
    }
}

/// Smart selector over a catalog store.
pub struct SmartSelector {
    store: MixStore,
    config: SelectorConfig,
    rng: Mutex<StdRng>,
}

impl SmartSelector {
    pub fn new(store: MixStore, config: SelectorConfig) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests and reproducible sessions.
    pub fn with_seed(store: MixStore, config: SelectorConfig, seed: u64) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().unwrap() = StdRng::seed_from_u64(seed);
    }

    fn roll_percent(&self) -> u32 {
        self.rng.lock().unwrap().random_range(0..100)
    }

    /// Uniform index into a collection of `len` items; zero for empty input.
    pub fn random_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.lock().unwrap().random_range(0..len)
    }

    /// Weighted pick: preferred genre, then favorites, then any downloaded
    /// entry, each with the freshness ordering; finally anything at all.
    ///
    /// `exclude_id` (when non-empty) is never returned while another
    /// candidate exists.
    pub fn select_smart(&self, exclude_id: &str, preferred_genre: &str) -> Result<Option<MixEntry>> {
        let criteria = SelectionCriteria {
            exclude_id: exclude_id.to_string(),
            downloaded_only: true,
            ..Default::default()
        };

        let counts = self.store.count_smart_candidates(&criteria, preferred_genre)?;

        if counts.total == 0 {
            // Nothing downloaded; fall back to the whole catalog.
            return self.select_random(exclude_id);
        }

        let prefer_genre = !preferred_genre.is_empty()
            && counts.preferred_genre > 0
            && self.roll_percent() < self.config.preferred_genre_probability;
        let prefer_favorites = !prefer_genre
            && counts.favorites > 0
            && self.roll_percent() < self.config.favorite_probability;

        if prefer_genre {
            let mut genre_criteria = criteria.clone();
            genre_criteria.genre = preferred_genre.to_string();
            if let Some(entry) = self.query_smart(&genre_criteria)? {
                return Ok(Some(entry));
            }
        }

        if prefer_favorites {
            let mut favorite_criteria = criteria.clone();
            favorite_criteria.favorites_only = true;
            if let Some(entry) = self.query_smart(&favorite_criteria)? {
                return Ok(Some(entry));
            }
        }

        if let Some(entry) = self.query_smart(&criteria)? {
            return Ok(Some(entry));
        }

        self.select_random(exclude_id)
    }

    /// Uniform random pick, preferring downloaded entries.
    pub fn select_random(&self, exclude_id: &str) -> Result<Option<MixEntry>> {
        let mut criteria = SelectionCriteria {
            exclude_id: exclude_id.to_string(),
            downloaded_only: true,
            ..Default::default()
        };

        if let Some(entry) = self.store.query_one(&criteria, OrderBy::Random)? {
            return Ok(Some(entry));
        }

        criteria.downloaded_only = false;
        self.store.query_one(&criteria, OrderBy::Random)
    }

    /// Uniform random pick within a genre (case-insensitive).
    pub fn select_random_by_genre(&self, genre: &str, exclude_id: &str) -> Result<Option<MixEntry>> {
        let criteria = SelectionCriteria {
            genre: genre.to_string(),
            exclude_id: exclude_id.to_string(),
            ..Default::default()
        };
        self.store.query_one(&criteria, OrderBy::Random)
    }

    /// Uniform random pick within an artist's entries.
    pub fn select_random_by_artist(&self, artist: &str, exclude_id: &str) -> Result<Option<MixEntry>> {
        let criteria = SelectionCriteria {
            artist: artist.to_string(),
            exclude_id: exclude_id.to_string(),
            ..Default::default()
        };
        self.store.query_one(&criteria, OrderBy::Random)
    }

    /// Entry following `current_id` in ascending id order, wrapping to the
    /// first entry past the end. An empty id yields the first entry.
    pub fn next(&self, current_id: &str) -> Result<Option<MixEntry>> {
        if current_id.is_empty() {
            return self.store.first_entry();
        }
        if let Some(entry) = self.store.entry_after(current_id)? {
            return Ok(Some(entry));
        }
        self.store.first_entry()
    }

    /// Entry preceding `current_id` in id order, wrapping to the last entry
    /// before the beginning. An empty id yields the last entry.
    pub fn previous(&self, current_id: &str) -> Result<Option<MixEntry>> {
        if current_id.is_empty() {
            return self.store.last_entry();
        }
        if let Some(entry) = self.store.entry_before(current_id)? {
            return Ok(Some(entry));
        }
        self.store.last_entry()
    }

    fn query_smart(&self, criteria: &SelectionCriteria) -> Result<Option<MixEntry>> {
        self.store.query_smart_one(
            criteria,
            self.config.prefer_unplayed,
            self.config.prefer_least_played,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, MixStore) {
        let dir = TempDir::new().unwrap();
        let store = MixStore::open(dir.path().join("mixes.db")).unwrap();
        (dir, store)
    }

    fn add_entry(store: &MixStore, id: &str, genre: &str, downloaded: bool) {
        let entry = MixEntry {
            id: id.to_string(),
            title: format!("Title {}", id),
            artist: "DJ Test".to_string(),
            genre: genre.to_string(),
            url: format!("https://mixes.example.com/{}.mp3", id),
            duration_seconds: 3600,
            ..Default::default()
        };
        store.add(&entry).unwrap();
        if downloaded {
            store.set_local_path(id, &format!("/cache/{}.mp3", id)).unwrap();
        }
    }

    fn config(genre_prob: u32, favorite_prob: u32) -> SelectorConfig {
        SelectorConfig {
            preferred_genre_probability: genre_prob,
            favorite_probability: favorite_prob,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_catalog_yields_none() {
        let (_dir, store) = open_store();
        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 1);
        assert!(selector.select_smart("", "").unwrap().is_none());
        assert!(selector.select_random("").unwrap().is_none());
        assert!(selector.next("").unwrap().is_none());
        assert!(selector.previous("").unwrap().is_none());
    }

    #[test]
    fn test_genre_preference_deterministic_at_full_probability() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "House", true);
        add_entry(&store, "c", "House", true);

        let selector = SmartSelector::with_seed(store, config(100, 0), 42);
        for _ in 0..20 {
            let picked = selector.select_smart("", "Techno").unwrap().unwrap();
            assert_eq!(picked.id, "a");
        }
    }

    #[test]
    fn test_genre_tier_skipped_at_zero_probability() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "House", true);

        let selector = SmartSelector::with_seed(store, config(0, 0), 42);
        let mut saw_other = false;
        for _ in 0..40 {
            let picked = selector.select_smart("", "Techno").unwrap().unwrap();
            if picked.id != "a" {
                saw_other = true;
            }
        }
        assert!(saw_other);
    }

    #[test]
    fn test_favorites_tier_deterministic_at_full_probability() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "House", true);
        store.toggle_favorite("b").unwrap();

        let selector = SmartSelector::with_seed(store, config(0, 100), 7);
        for _ in 0..20 {
            let picked = selector.select_smart("", "").unwrap().unwrap();
            assert_eq!(picked.id, "b");
        }
    }

    #[test]
    fn test_exclusion_is_honored() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "Techno", true);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 99);
        for _ in 0..30 {
            let picked = selector.select_smart("a", "").unwrap().unwrap();
            assert_ne!(picked.id, "a");
        }
    }

    #[test]
    fn test_falls_back_to_undownloaded_when_nothing_cached() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", false);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 3);
        let picked = selector.select_smart("", "Techno").unwrap().unwrap();
        assert_eq!(picked.id, "a");
    }

    #[test]
    fn test_downloaded_preferred_over_available() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", false);
        add_entry(&store, "b", "Techno", true);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 5);
        for _ in 0..20 {
            let picked = selector.select_random("").unwrap().unwrap();
            assert_eq!(picked.id, "b");
        }
    }

    #[test]
    fn test_select_by_genre_and_artist() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "House", true);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 11);
        let picked = selector.select_random_by_genre("house", "").unwrap().unwrap();
        assert_eq!(picked.id, "b");
        assert!(selector
            .select_random_by_genre("house", "b")
            .unwrap()
            .is_none());

        let picked = selector.select_random_by_artist("DJ Test", "a").unwrap().unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_next_previous_wraparound() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "Techno", true);
        add_entry(&store, "c", "Techno", true);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 0);

        assert_eq!(selector.next("").unwrap().unwrap().id, "a");
        assert_eq!(selector.next("a").unwrap().unwrap().id, "b");
        assert_eq!(selector.next("c").unwrap().unwrap().id, "a");

        assert_eq!(selector.previous("").unwrap().unwrap().id, "c");
        assert_eq!(selector.previous("c").unwrap().unwrap().id, "b");
        assert_eq!(selector.previous("a").unwrap().unwrap().id, "c");
    }

    #[test]
    fn test_deleted_entries_never_selected() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);
        add_entry(&store, "b", "Techno", true);
        store.soft_delete("a").unwrap();

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 23);
        for _ in 0..20 {
            assert_eq!(selector.select_smart("", "").unwrap().unwrap().id, "b");
        }
        assert_eq!(selector.next("").unwrap().unwrap().id, "b");
        assert_eq!(selector.previous("").unwrap().unwrap().id, "b");
    }

    #[test]
    fn test_excluding_only_candidate_yields_none() {
        let (_dir, store) = open_store();
        add_entry(&store, "a", "Techno", true);

        let selector = SmartSelector::with_seed(store, SelectorConfig::default(), 17);
        assert!(selector.select_smart("a", "").unwrap().is_none());
    }
}
