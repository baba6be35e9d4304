//! Data models for the mix catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a catalog entry.
///
/// Deleted entries keep their row (play history, favorites) but are excluded
/// from every query unless the caller opts in with `include_deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    #[default]
    Active,
    Deleted,
}

impl EntryState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, EntryState::Deleted)
    }

    pub fn from_db_flag(flag: i64) -> Self {
        if flag != 0 {
            EntryState::Deleted
        } else {
            EntryState::Active
        }
    }

    pub fn as_db_flag(&self) -> i64 {
        match self {
            EntryState::Active => 0,
            EntryState::Deleted => 1,
        }
    }
}

/// One mix in the catalog.
///
/// The id is derived deterministically from the source URL; a non-empty
/// `local_path` is the operational definition of "downloaded".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MixEntry {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub url: String,
    pub local_path: Option<String>,
    pub duration_seconds: i64,
    pub tags: Vec<String>,
    pub description: String,
    pub date_added: Option<DateTime<Utc>>,
    pub last_played: Option<DateTime<Utc>>,
    pub play_count: i64,
    pub is_favorite: bool,
    pub state: EntryState,
}

impl MixEntry {
    /// True once the entry has a local file recorded.
    pub fn is_downloaded(&self) -> bool {
        self.local_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Filter and ordering criteria passed to the query builder.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Genre filter, matched case-insensitively. Empty means no filter.
    pub genre: String,
    /// Artist filter, matched exactly. Empty means no filter.
    pub artist: String,
    /// Entry id to exclude (typically the one currently playing).
    pub exclude_id: String,
    pub favorites_only: bool,
    pub downloaded_only: bool,
    /// Opt-in to also see soft-deleted rows.
    pub include_deleted: bool,
    /// Row cap; zero or negative means unlimited.
    pub limit: i64,
}

/// Candidate counts used by the smart selector to pick a strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionCounts {
    pub total: i64,
    pub favorites: i64,
    pub preferred_genre: i64,
}
