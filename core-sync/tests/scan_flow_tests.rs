//! End-to-end scan and planning flow over a real temporary directory and an
//! in-memory catalog.

use async_trait::async_trait;
use core_catalog::{create_test_pool, CatalogStore, SqliteCatalogStore};
use core_metadata::{AudioTags, MetadataError, TagReader};
use core_runtime::config::ScanSettings;
use core_runtime::events::EventBus;
use core_sync::planner::build_plan;
use core_sync::scanner::Scanner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Derives tags from the file name; any file whose name contains "broken"
/// fails extraction.
struct FakeTagReader;

#[async_trait]
impl TagReader for FakeTagReader {
    async fn extract(&self, path: &Path) -> core_metadata::Result<AudioTags> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        if name.contains("broken") {
            return Err(MetadataError::UnreadableMedia {
                path: path.display().to_string(),
                reason: "synthetic parse failure".to_string(),
            });
        }
        Ok(AudioTags {
            title: Some(name.clone()),
            artist: Some("Artist".to_string()),
            album: Some("Album".to_string()),
            codec: Some("mp3".to_string()),
            file_size: Some(1),
            ..Default::default()
        })
    }
}

struct Fixture {
    dir: TempDir,
    catalog: Arc<SqliteCatalogStore>,
    scanner: Scanner,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(SqliteCatalogStore::new(create_test_pool().await.unwrap()));
        let scanner = Scanner::new(
            catalog.clone() as Arc<dyn CatalogStore>,
            Arc::new(FakeTagReader),
            EventBus::default(),
        );
        Self {
            dir,
            catalog,
            scanner,
        }
    }

    fn write(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"audio bytes").unwrap();
        path
    }

    fn settings(&self) -> ScanSettings {
        ScanSettings {
            roots: vec![self.dir.path().to_path_buf()],
            excluded_dirs: vec!["skipme".to_string()],
            allowed_extensions: vec!["mp3".to_string()],
            full_refresh: false,
        }
    }
}

#[tokio::test]
async fn scan_catalogs_new_files_and_prunes_exclusions() {
    let fx = Fixture::new().await;
    fx.write("one.mp3");
    fx.write("sub/two.mp3");
    fx.write("notes.txt");
    fx.write("skipme/three.mp3");

    let stats = fx.scanner.run_scan(&fx.settings()).await.unwrap();
    assert_eq!(stats.added, 2);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.missing, 0);

    let rows = fx.catalog.all_tracks().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|t| t.relative_path.starts_with("Artist/Album/")));
    assert!(rows.iter().all(|t| !t.sync));
}

#[tokio::test]
async fn rescan_without_changes_is_idempotent() {
    let fx = Fixture::new().await;
    fx.write("one.mp3");
    fx.write("two.mp3");

    fx.scanner.run_scan(&fx.settings()).await.unwrap();
    let second = fx.scanner.run_scan(&fx.settings()).await.unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.missing, 0);
}

#[tokio::test]
async fn full_refresh_re_extracts_known_files() {
    let fx = Fixture::new().await;
    fx.write("one.mp3");

    fx.scanner.run_scan(&fx.settings()).await.unwrap();
    let mut settings = fx.settings();
    settings.full_refresh = true;
    let second = fx.scanner.run_scan(&settings).await.unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 1);
}

#[tokio::test]
async fn deleted_file_goes_missing_and_reappears_clean() {
    let fx = Fixture::new().await;
    let path = fx.write("one.mp3");
    fx.write("keep.mp3");

    fx.scanner.run_scan(&fx.settings()).await.unwrap();
    fx.catalog
        .set_sync(&path.to_string_lossy(), true)
        .await
        .unwrap();

    std::fs::remove_file(&path).unwrap();
    let stats = fx.scanner.run_scan(&fx.settings()).await.unwrap();
    assert_eq!(stats.missing, 1);

    let row = fx
        .catalog
        .find_by_path(&path.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_missing());

    // A missing row is excluded from the plan even though sync is set.
    let plan = build_plan(&fx.catalog.all_tracks().await.unwrap(), "/dest");
    assert!(plan.iter().all(|e| !e.source_path.ends_with("one.mp3")));

    // Restore the file: status clears, metadata refreshes, flag survives.
    fx.write("one.mp3");
    let stats = fx.scanner.run_scan(&fx.settings()).await.unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.missing, 0);

    let row = fx
        .catalog
        .find_by_path(&path.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert!(!row.is_missing());
    assert!(row.sync);
}

#[tokio::test]
async fn one_unreadable_file_does_not_poison_the_batch() {
    let fx = Fixture::new().await;
    for name in ["a.mp3", "b.mp3", "c.mp3", "d.mp3"] {
        fx.write(name);
    }
    fx.write("broken.mp3");

    fx.scanner.run_scan(&fx.settings()).await.unwrap();

    let rows = fx.catalog.all_tracks().await.unwrap();
    assert_eq!(rows.len(), 5);

    let healthy: Vec<_> = rows.iter().filter(|t| t.status.is_empty()).collect();
    assert_eq!(healthy.len(), 4);

    let broken = rows
        .iter()
        .find(|t| t.source_path.ends_with("broken.mp3"))
        .unwrap();
    assert!(broken.status.starts_with("Unreadable:"));
    // Layout falls back to the bare file name.
    assert_eq!(broken.relative_path, "broken.mp3");
}

#[tokio::test]
async fn plan_covers_exactly_the_flagged_rows_in_insertion_order() {
    let fx = Fixture::new().await;
    for name in ["a.mp3", "b.mp3", "c.mp3"] {
        fx.write(name);
    }
    fx.scanner.run_scan(&fx.settings()).await.unwrap();

    let rows = fx.catalog.all_tracks().await.unwrap();
    fx.catalog
        .set_sync(&rows[2].source_path, true)
        .await
        .unwrap();
    fx.catalog
        .set_sync(&rows[0].source_path, true)
        .await
        .unwrap();

    let candidates = fx.catalog.query_sync_candidates().await.unwrap();
    let plan = build_plan(&candidates, "/sdcard/Music");

    assert_eq!(plan.len(), 2);
    assert!(plan[0].track_id < plan[1].track_id);
    assert!(plan
        .iter()
        .all(|e| e.dest_path.starts_with("/sdcard/Music/Artist/Album/")));
}

#[tokio::test]
async fn unreadable_root_is_non_fatal() {
    let fx = Fixture::new().await;
    fx.write("one.mp3");

    let mut settings = fx.settings();
    settings
        .roots
        .push(PathBuf::from("/nonexistent/music/root"));

    let stats = fx.scanner.run_scan(&settings).await.unwrap();
    assert_eq!(stats.added, 1);
}
