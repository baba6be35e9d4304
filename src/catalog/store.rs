//! SQLite-backed store for the mix catalog.
//!
//! Single durable table keyed by entry id, opened in WAL mode. Writes are
//! validated first and executed as single statements; reads exclude
//! soft-deleted rows unless the caller opts in through `SelectionCriteria`.

use super::models::{EntryState, MixEntry, SelectionCounts, SelectionCriteria};
use super::query::{params_from_criteria, OrderBy, QueryBuilder};
use super::schema::migrate_if_needed;
use super::validation::validate_entry;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct MixStore {
    conn: Arc<Mutex<Connection>>,
}

impl MixStore {
    /// Open (or create) the catalog database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        migrate_if_needed(&mut conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let entry_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM mixes", [], |r| r.get(0))
            .unwrap_or(0);
        info!("Opened mix catalog with {} entries", entry_count);

        Ok(MixStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<MixEntry> {
        let tags_json: Option<String> = row.get(7)?;
        let tags = match tags_json {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(&raw).unwrap_or_else(|_| vec![raw])
            }
            _ => Vec::new(),
        };

        let date_added: Option<String> = row.get(9)?;
        let last_played: Option<String> = row.get(10)?;

        Ok(MixEntry {
            id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            genre: row.get(3)?,
            url: row.get(4)?,
            local_path: row.get(5)?,
            duration_seconds: row.get(6)?,
            tags,
            description: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            date_added: date_added.as_deref().and_then(parse_timestamp),
            last_played: last_played.as_deref().and_then(parse_timestamp),
            play_count: row.get(11)?,
            is_favorite: row.get::<_, i64>(12)? != 0,
            state: EntryState::from_db_flag(row.get(13)?),
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert or replace an entry, keyed by id. Validates first.
    pub fn add(&self, entry: &MixEntry) -> Result<()> {
        validate_entry(entry).context("Rejected invalid entry")?;

        let tags_json = serde_json::to_string(&entry.tags)?;
        let date_added = entry
            .date_added
            .map(|ts| format_timestamp(&ts))
            .unwrap_or_else(|| format_timestamp(&Utc::now()));
        let last_played = entry.last_played.map(|ts| format_timestamp(&ts));

        let conn = self.conn.lock().unwrap();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO mixes
             (id, title, artist, genre, url, local_path, duration_seconds, tags,
              description, date_added, last_played, play_count, is_favorite, is_deleted)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?
        .execute(params![
            entry.id,
            entry.title,
            entry.artist,
            entry.genre,
            entry.url,
            entry.local_path,
            entry.duration_seconds,
            tags_json,
            entry.description,
            date_added,
            last_played,
            entry.play_count,
            entry.is_favorite as i64,
            entry.state.as_db_flag(),
        ])
        .context("Failed to insert entry")?;

        Ok(())
    }

    /// Update an existing entry by id. Validates first; fails when the id is
    /// not present.
    pub fn update(&self, entry: &MixEntry) -> Result<()> {
        validate_entry(entry).context("Rejected invalid entry")?;

        let tags_json = serde_json::to_string(&entry.tags)?;
        let date_added = entry.date_added.map(|ts| format_timestamp(&ts));
        let last_played = entry.last_played.map(|ts| format_timestamp(&ts));

        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached(
                "UPDATE mixes SET title = ?, artist = ?, genre = ?, url = ?, local_path = ?,
                 duration_seconds = ?, tags = ?, description = ?, date_added = ?,
                 last_played = ?, play_count = ?, is_favorite = ?, is_deleted = ?
                 WHERE id = ?",
            )?
            .execute(params![
                entry.title,
                entry.artist,
                entry.genre,
                entry.url,
                entry.local_path,
                entry.duration_seconds,
                tags_json,
                entry.description,
                date_added,
                last_played,
                entry.play_count,
                entry.is_favorite as i64,
                entry.state.as_db_flag(),
                entry.id,
            ])
            .context("Failed to update entry")?;

        if changed == 0 {
            bail!("No entry found with id: {}", entry.id);
        }
        Ok(())
    }

    /// Hard delete: the row is removed entirely.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached("DELETE FROM mixes WHERE id = ?")?
            .execute(params![id])
            .context("Failed to delete entry")?;
        if changed == 0 {
            bail!("No entry found with id: {}", id);
        }
        Ok(())
    }

    /// Soft delete: the row stays for history but drops out of queries.
    pub fn soft_delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached("UPDATE mixes SET is_deleted = 1 WHERE id = ?")?
            .execute(params![id])
            .context("Failed to soft-delete entry")?;
        if changed == 0 {
            bail!("No entry found with id: {}", id);
        }
        Ok(())
    }

    pub fn toggle_favorite(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached("UPDATE mixes SET is_favorite = NOT is_favorite WHERE id = ?")?
            .execute(params![id])
            .context("Failed to toggle favorite")?;
        if changed == 0 {
            bail!("No entry found with id: {}", id);
        }
        Ok(())
    }

    /// Bump play count and stamp last-played to now.
    pub fn update_play_stats(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached(
                "UPDATE mixes SET play_count = play_count + 1, last_played = ? WHERE id = ?",
            )?
            .execute(params![format_timestamp(&Utc::now()), id])
            .context("Failed to update play stats")?;
        if changed == 0 {
            bail!("No entry found with id: {}", id);
        }
        Ok(())
    }

    pub fn set_local_path(&self, id: &str, local_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .prepare_cached("UPDATE mixes SET local_path = ? WHERE id = ?")?
            .execute(params![local_path, id])
            .context("Failed to set local path")?;
        if changed == 0 {
            bail!("No entry found with id: {}", id);
        }
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Direct lookup by id; returns the row regardless of deletion state.
    pub fn get_by_id(&self, id: &str) -> Result<Option<MixEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM mixes WHERE id = ?")?;
        match stmt.query_row(params![id], Self::entry_from_row) {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_all(&self) -> Result<Vec<MixEntry>> {
        self.query_sql("SELECT * FROM mixes WHERE is_deleted = 0 ORDER BY title", &[])
    }

    pub fn get_by_genre(&self, genre: &str) -> Result<Vec<MixEntry>> {
        self.query_sql(
            "SELECT * FROM mixes WHERE genre = ? COLLATE NOCASE AND is_deleted = 0 ORDER BY title",
            &[genre],
        )
    }

    pub fn get_by_artist(&self, artist: &str) -> Result<Vec<MixEntry>> {
        self.query_sql(
            "SELECT * FROM mixes WHERE artist = ? AND is_deleted = 0 ORDER BY title",
            &[artist],
        )
    }

    pub fn get_downloaded(&self) -> Result<Vec<MixEntry>> {
        self.query_sql(
            "SELECT * FROM mixes WHERE local_path IS NOT NULL AND local_path != ''
             AND is_deleted = 0 ORDER BY title",
            &[],
        )
    }

    pub fn get_favorites(&self) -> Result<Vec<MixEntry>> {
        self.query_sql(
            "SELECT * FROM mixes WHERE is_favorite = 1 AND is_deleted = 0 ORDER BY title",
            &[],
        )
    }

    pub fn get_recently_played(&self, limit: i64) -> Result<Vec<MixEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM mixes WHERE last_played IS NOT NULL AND is_deleted = 0
             ORDER BY last_played DESC LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![limit], Self::entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Total number of rows, deleted included. Used to detect the very first
    /// entry ever added.
    pub fn count_all(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM mixes", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Distinct non-empty genres of active rows, in catalog casing.
    pub fn distinct_genres(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT genre FROM mixes WHERE is_deleted = 0 AND genre != '' ORDER BY genre",
        )?;
        let genres = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(genres)
    }

    /// Every row carrying a local path, deleted rows included. Used by the
    /// filesystem reconciliation routines.
    pub fn entries_with_local_path(&self) -> Result<Vec<MixEntry>> {
        self.query_sql(
            "SELECT * FROM mixes WHERE local_path IS NOT NULL AND local_path != ''",
            &[],
        )
    }

    /// Every row in the table, deleted included.
    pub fn all_rows(&self) -> Result<Vec<MixEntry>> {
        self.query_sql("SELECT * FROM mixes", &[])
    }

    // =========================================================================
    // Criteria-driven queries (selector support)
    // =========================================================================

    /// Run a criteria-built query with the given ordering.
    pub fn query_entries(&self, criteria: &SelectionCriteria, order: OrderBy) -> Result<Vec<MixEntry>> {
        let sql = QueryBuilder::build_query(criteria, order);
        let param_values = params_from_criteria(criteria);
        let params: Vec<&str> = param_values.iter().map(String::as_str).collect();
        self.query_sql(&sql, &params)
    }

    /// Single row from a criteria-built query, or None.
    pub fn query_one(&self, criteria: &SelectionCriteria, order: OrderBy) -> Result<Option<MixEntry>> {
        let mut limited = criteria.clone();
        limited.limit = 1;
        Ok(self.query_entries(&limited, order)?.into_iter().next())
    }

    /// Single row picked with the smart freshness ordering.
    pub fn query_smart_one(
        &self,
        criteria: &SelectionCriteria,
        prefer_unplayed: bool,
        prefer_least_played: bool,
    ) -> Result<Option<MixEntry>> {
        let mut builder = QueryBuilder::new();
        builder
            .apply_criteria(criteria)
            .order_by_smart(prefer_unplayed, prefer_least_played)
            .limit(1);
        let sql = builder.build();
        let param_values = params_from_criteria(criteria);
        let params: Vec<&str> = param_values.iter().map(String::as_str).collect();
        Ok(self.query_sql(&sql, &params)?.into_iter().next())
    }

    /// Candidate counts for smart selection: total and favorite rows matching
    /// the criteria, plus rows matching the preferred genre when one is set.
    pub fn count_smart_candidates(
        &self,
        criteria: &SelectionCriteria,
        preferred_genre: &str,
    ) -> Result<SelectionCounts> {
        let mut sql = String::from(
            "SELECT COUNT(*) AS total,
                    SUM(CASE WHEN is_favorite = 1 THEN 1 ELSE 0 END) AS favorites",
        );
        let mut param_values: Vec<String> = Vec::new();

        if !preferred_genre.is_empty() {
            sql.push_str(", SUM(CASE WHEN genre = ? COLLATE NOCASE THEN 1 ELSE 0 END) AS preferred");
            param_values.push(preferred_genre.to_string());
        }

        sql.push_str(" FROM mixes WHERE is_deleted = 0");
        if criteria.downloaded_only {
            sql.push_str(" AND local_path IS NOT NULL AND local_path != ''");
        }
        if !criteria.exclude_id.is_empty() {
            sql.push_str(" AND id != ?");
            param_values.push(criteria.exclude_id.clone());
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&sql)?;
        let counts = stmt.query_row(params_from_iter(param_values.iter()), |row| {
            let total: i64 = row.get(0)?;
            let favorites: Option<i64> = row.get(1)?;
            let preferred = if preferred_genre.is_empty() {
                0
            } else {
                row.get::<_, Option<i64>>(2)?.unwrap_or(0)
            };
            Ok(SelectionCounts {
                total,
                favorites: favorites.unwrap_or(0),
                preferred_genre: preferred,
            })
        })?;
        Ok(counts)
    }

    // =========================================================================
    // Id-cursor reads (next/previous navigation)
    // =========================================================================

    pub fn first_entry(&self) -> Result<Option<MixEntry>> {
        self.query_sql_one(
            "SELECT * FROM mixes WHERE is_deleted = 0 ORDER BY id LIMIT 1",
            &[],
        )
    }

    pub fn last_entry(&self) -> Result<Option<MixEntry>> {
        self.query_sql_one(
            "SELECT * FROM mixes WHERE is_deleted = 0 ORDER BY id DESC LIMIT 1",
            &[],
        )
    }

    /// First entry with an id strictly greater than `id`.
    pub fn entry_after(&self, id: &str) -> Result<Option<MixEntry>> {
        self.query_sql_one(
            "SELECT * FROM mixes WHERE id > ? AND is_deleted = 0 ORDER BY id LIMIT 1",
            &[id],
        )
    }

    /// Last entry with an id strictly less than `id`.
    pub fn entry_before(&self, id: &str) -> Result<Option<MixEntry>> {
        self.query_sql_one(
            "SELECT * FROM mixes WHERE id < ? AND is_deleted = 0 ORDER BY id DESC LIMIT 1",
            &[id],
        )
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn query_sql(&self, sql: &str, params: &[&str]) -> Result<Vec<MixEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let entries = stmt
            .query_map(params_from_iter(params.iter()), Self::entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn query_sql_one(&self, sql: &str, params: &[&str]) -> Result<Option<MixEntry>> {
        Ok(self.query_sql(sql, params)?.into_iter().next())
    }
}
