//! Self-healing maintenance over the cache directory and the store.
//!
//! These routines reconcile filesystem and catalog drift: garbage files in
//! the cache, rows pointing at files that no longer exist, and rows whose id
//! no longer matches their source URL. They run at initialization and can be
//! re-run at any time.

use crate::analyzer::has_valid_header;
use crate::catalog::MixStore;
use crate::ids::entry_id_from_url;
use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Scan the cache directory and delete every `.mp3` file that fails the
/// container header check. Returns the number of files removed.
pub fn cleanup_corrupted_local_files(cache_dir: &Path) -> Result<usize> {
    if !cache_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(cache_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
            continue;
        }
        if !has_valid_header(path) {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    warn!("Removed corrupted file: {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove corrupted file {}: {}", path.display(), e),
            }
        }
    }

    if removed > 0 {
        info!("Cleaned up {} corrupted files", removed);
    }
    Ok(removed)
}

/// Drop catalog rows whose recorded local file no longer exists on disk.
/// Returns the number of rows removed.
pub fn cleanup_missing_files(store: &MixStore) -> Result<usize> {
    let mut removed = 0;
    for entry in store.entries_with_local_path()? {
        let Some(local_path) = entry.local_path.as_deref() else {
            continue;
        };
        if !Path::new(local_path).exists() {
            store.delete(&entry.id)?;
            info!("Removed entry {} with missing file {}", entry.id, local_path);
            removed += 1;
        }
    }
    Ok(removed)
}

/// Recompute each row's id from its URL and migrate rows whose stored id
/// disagrees. Returns the number of rows migrated.
pub fn cleanup_inconsistent_ids(store: &MixStore) -> Result<usize> {
    let mut migrated = 0;
    for entry in store.all_rows()? {
        if entry.url.is_empty() {
            continue;
        }
        let expected_id = entry_id_from_url(&entry.url);
        if expected_id == entry.id {
            continue;
        }

        let mut corrected = entry.clone();
        corrected.id = expected_id.clone();

        store.delete(&entry.id)?;
        store.add(&corrected)?;
        info!("Migrated entry {} to recomputed id {}", entry.id, expected_id);
        migrated += 1;
    }
    Ok(migrated)
}
