//! End-to-end tests for the full engine pipeline: manifest sync, background
//! download, catalog persistence, selection, playback, and maintenance.

use anyhow::Result;
use mixdeck::analyzer::{TagReader, TrackTags};
use mixdeck::engine::EngineSettings;
use mixdeck::{Downloader, ManifestEntry, MixEngine, MixStore, NullPlayer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Analyzer that derives metadata from the source filename, standing in for
/// real tag extraction.
struct FilenameReader;

impl TagReader for FilenameReader {
    fn read_tags(&self, path: &Path) -> Result<TrackTags> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        // Stable across re-analysis of a file this reader already named.
        let title = if stem.starts_with("Title ") {
            stem
        } else {
            format!("Title {}", stem)
        };
        Ok(TrackTags {
            title,
            artist: "DJ E2E".to_string(),
            genre: "Techno".to_string(),
            duration_seconds: 3600,
            ..Default::default()
        })
    }
}

struct TestEnv {
    _dir: TempDir,
    engine: Arc<MixEngine>,
    manifest_path: PathBuf,
}

fn setup(mix_names: &[&str]) -> TestEnv {
    let dir = TempDir::new().unwrap();

    let mut urls = Vec::new();
    for name in mix_names {
        let source = dir.path().join(format!("{}.mp3", name));
        fs::write(&source, b"ID3\x04\x00\x00\x00\x00\x00\x00payload").unwrap();
        urls.push(format!("\"file://{}\"", source.display()));
    }
    let manifest_path = dir.path().join("mixes.json");
    fs::write(&manifest_path, format!(r#"{{"mixes": [{}]}}"#, urls.join(","))).unwrap();

    let store = MixStore::open(dir.path().join("mixes.db")).unwrap();
    let downloader = Downloader::new(dir.path().join("cache"), Duration::from_secs(5)).unwrap();
    let settings = EngineSettings {
        selector_seed: Some(1234),
        ..Default::default()
    };
    let engine = MixEngine::new(
        store,
        downloader,
        Arc::new(FilenameReader),
        Arc::new(NullPlayer::new()),
        settings,
    )
    .unwrap();

    TestEnv {
        _dir: dir,
        engine,
        manifest_path,
    }
}

async fn sync_and_download(env: &TestEnv) {
    let manifest = env.manifest_path.to_str().unwrap();
    env.engine.sync_remote_metadata(manifest).await.unwrap();
    env.engine.download_available_in_background();
    env.engine.wait_for_downloads().await;
    env.engine.reap_completed();
}

#[tokio::test]
async fn test_sync_download_and_persist_pipeline() {
    let env = setup(&["alpha-techno", "bravo", "charlie"]);
    sync_and_download(&env).await;

    let entries = env.engine.all_entries().unwrap();
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        assert!(entry.is_downloaded());
        assert_eq!(entry.artist, "DJ E2E");
        assert!(entry.duration_seconds > 0);
    }

    // Re-sync: everything is known now, nothing left to download.
    let manifest = env.manifest_path.to_str().unwrap();
    let new_count = env.engine.sync_remote_metadata(manifest).await.unwrap();
    assert_eq!(new_count, 0);
    assert!(env.engine.available_entries().is_empty());
}

#[tokio::test]
async fn test_playback_and_selection_flow() {
    let env = setup(&["alpha-techno", "bravo", "charlie"]);
    sync_and_download(&env).await;

    let played = env.engine.play_smart().unwrap().unwrap();
    assert!(env.engine.is_playing());
    assert_eq!(env.engine.current_entry().unwrap().id, played.id);

    // The next smart pick never repeats the current entry.
    for _ in 0..10 {
        let pick = env
            .engine
            .select_smart(&played.id, "")
            .unwrap()
            .unwrap();
        assert_ne!(pick.id, played.id);
    }

    // Id-order navigation wraps around in both directions.
    let mut ids: Vec<String> = env
        .engine
        .all_entries()
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    ids.sort();

    let last = ids.last().unwrap().clone();
    let first = ids.first().unwrap().clone();
    let selector_next = env.engine.next_entry().unwrap().unwrap();
    assert!(ids.contains(&selector_next.id));

    let store = env.engine.store();
    assert!(store.entry_after(&last).unwrap().is_none());
    assert_eq!(store.first_entry().unwrap().unwrap().id, first);
}

#[tokio::test]
async fn test_favorites_and_soft_delete_flow() {
    let env = setup(&["alpha-techno", "bravo"]);
    sync_and_download(&env).await;

    let entries = env.engine.all_entries().unwrap();
    let favorite_id = entries[0].id.clone();
    let deleted_id = entries[1].id.clone();

    env.engine.toggle_favorite(&favorite_id).unwrap();
    assert_eq!(env.engine.favorite_entries().unwrap().len(), 1);

    env.engine.soft_delete(&deleted_id).unwrap();
    assert_eq!(env.engine.all_entries().unwrap().len(), 1);

    // Smart selection never surfaces the deleted entry.
    for _ in 0..10 {
        let pick = env.engine.select_smart("", "").unwrap().unwrap();
        assert_eq!(pick.id, favorite_id);
    }
}

#[tokio::test]
async fn test_crossfade_over_engine_ticks() {
    let env = setup(&["alpha-techno", "bravo"]);
    sync_and_download(&env).await;

    let entries = env.engine.all_entries().unwrap();
    env.engine.play(&entries[0]).unwrap();
    env.engine.set_volume(60);

    env.engine
        .start_crossfade(&entries[1], Duration::from_millis(500))
        .unwrap();
    assert_eq!(env.engine.current_entry().unwrap().id, entries[1].id);
    assert_eq!(env.engine.volume(), 0);

    let start = Instant::now();
    env.engine.tick(start + Duration::from_millis(250));
    assert!(env.engine.volume() < 60);
    assert!(env.engine.crossfade_active());

    env.engine.tick(start + Duration::from_millis(600));
    assert!(!env.engine.crossfade_active());
    assert_eq!(env.engine.volume(), 60);
}

#[tokio::test]
async fn test_maintenance_heals_missing_files() {
    let env = setup(&["alpha-techno", "bravo"]);
    sync_and_download(&env).await;

    let entries = env.engine.all_entries().unwrap();
    let lost = &entries[0];
    fs::remove_file(lost.local_path.as_deref().unwrap()).unwrap();

    env.engine.run_maintenance().unwrap();

    assert!(env.engine.get_by_id(&lost.id).unwrap().is_none());
    assert_eq!(env.engine.all_entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_background_downloads_coalesce() {
    let env = setup(&[]);

    let source = env.manifest_path.parent().unwrap().join("solo.mp3");
    fs::write(&source, b"ID3\x04\x00\x00\x00\x00\x00\x00payload").unwrap();
    let url = format!("file://{}", source.display());
    let entry = ManifestEntry {
        id: mixdeck::ids::entry_id_from_url(&url),
        url,
        ..Default::default()
    };

    let first = env.engine.download_in_background(entry.clone());
    let second = env.engine.download_in_background(entry.clone());
    assert!(first);
    // Either the duplicate was rejected while in flight, or the first had
    // already finished and the second became a store-level no-op.
    env.engine.wait_for_downloads().await;

    assert!(env.engine.get_by_id(&entry.id).unwrap().is_some());
    assert_eq!(env.engine.store().count_all().unwrap(), 1);
    let _ = second;
}
