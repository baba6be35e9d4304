//! SQLite schema for the mix catalog database.
//!
//! Versioned schema list: version N's `migration` upgrades a version N-1
//! database. New databases are created directly at the latest version.

use anyhow::Result;
use rusqlite::Connection;

/// Offset added to the schema version stored in `PRAGMA user_version`, so a
/// plain zero (never-initialized database) is distinguishable from version 0.
pub const BASE_DB_VERSION: usize = 9000;

pub struct VersionedSchema {
    pub version: usize,
    pub create_sql: &'static str,
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(self.create_sql)?;
        conn.pragma_update(None, "user_version", BASE_DB_VERSION + self.version)?;
        Ok(())
    }
}

const MIXES_SCHEMA_V0: &str = "
    CREATE TABLE IF NOT EXISTS mixes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        genre TEXT NOT NULL,
        url TEXT NOT NULL,
        local_path TEXT,
        duration_seconds INTEGER NOT NULL,
        tags TEXT,
        description TEXT,
        date_added DATETIME DEFAULT CURRENT_TIMESTAMP,
        last_played DATETIME,
        play_count INTEGER DEFAULT 0,
        is_favorite BOOLEAN DEFAULT 0,
        is_deleted BOOLEAN DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_mixes_genre ON mixes(genre);
    CREATE INDEX IF NOT EXISTS idx_mixes_artist ON mixes(artist);
    CREATE INDEX IF NOT EXISTS idx_mixes_favorite ON mixes(is_favorite);
    CREATE INDEX IF NOT EXISTS idx_mixes_last_played ON mixes(last_played);
    CREATE INDEX IF NOT EXISTS idx_mixes_deleted ON mixes(is_deleted);
";

pub const MIXES_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    create_sql: MIXES_SCHEMA_V0,
    migration: None,
}];

/// Create or migrate the schema as needed.
pub fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let latest_version = MIXES_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &MIXES_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        return latest_schema.create(conn);
    }

    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        // Pre-versioning database, treat as version 0.
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in MIXES_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            tracing::info!(
                "Migrating catalog db from version {} to {}",
                current_version,
                schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;

    Ok(())
}
