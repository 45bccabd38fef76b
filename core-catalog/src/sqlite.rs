//! SQLite implementation of the catalog store.

use crate::error::{CatalogError, Result};
use crate::models::{Track, TrackUpsert, STATUS_MISSING};
use crate::store::CatalogStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query_as, SqlitePool};
use tracing::debug;

/// Catalog store backed by a SQLite pool.
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Create a new store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert_track(&self, change: &TrackUpsert) -> Result<Track> {
        change
            .validate()
            .map_err(|msg| CatalogError::InvalidInput {
                field: "track".to_string(),
                message: msg,
            })?;

        let now = Utc::now();

        // The conflict clause deliberately leaves `sync` and `added_at`
        // out of the update set: those belong to the user-owned region.
        sqlx::query(
            r#"
            INSERT INTO tracks (
                source_path, title, artist, album, album_artist, composer,
                track_num, duration_secs, codec, file_size, relative_path,
                sync, status, added_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT(source_path) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                composer = excluded.composer,
                track_num = excluded.track_num,
                duration_secs = excluded.duration_secs,
                codec = excluded.codec,
                file_size = excluded.file_size,
                relative_path = excluded.relative_path,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&change.source_path)
        .bind(&change.title)
        .bind(&change.artist)
        .bind(&change.album)
        .bind(&change.album_artist)
        .bind(&change.composer)
        .bind(&change.track_num)
        .bind(change.duration_secs)
        .bind(&change.codec)
        .bind(change.file_size)
        .bind(&change.relative_path)
        .bind(&change.status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(source_path = %change.source_path, "Upserted track");

        self.find_by_path(&change.source_path)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                source_path: change.source_path.clone(),
            })
    }

    async fn find_by_path(&self, source_path: &str) -> Result<Option<Track>> {
        let track = query_as::<_, Track>("SELECT * FROM tracks WHERE source_path = ?")
            .bind(source_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(track)
    }

    async fn all_tracks(&self) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>("SELECT * FROM tracks ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(tracks)
    }

    async fn query_sync_candidates(&self) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>("SELECT * FROM tracks WHERE sync = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(tracks)
    }

    async fn mark_missing(&self, source_paths: &[String]) -> Result<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;

        for path in source_paths {
            let result = sqlx::query(
                "UPDATE tracks SET status = ?, updated_at = ? \
                 WHERE source_path = ? AND status != ?",
            )
            .bind(STATUS_MISSING)
            .bind(now)
            .bind(path)
            .bind(STATUS_MISSING)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn set_sync(&self, source_path: &str, sync: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE tracks SET sync = ? WHERE source_path = ?")
            .bind(sync)
            .bind(source_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn change(path: &str, artist: &str) -> TrackUpsert {
        TrackUpsert {
            source_path: path.to_string(),
            title: Some("Song".to_string()),
            artist: Some(artist.to_string()),
            album: Some("Album".to_string()),
            codec: Some("mp3".to_string()),
            relative_path: format!("{}/Album/song.mp3", artist),
            ..Default::default()
        }
    }

    async fn store() -> SqliteCatalogStore {
        SqliteCatalogStore::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_inserts_with_defaults() {
        let store = store().await;
        let track = store.upsert_track(&change("/m/a.mp3", "A")).await.unwrap();

        assert_eq!(track.source_path, "/m/a.mp3");
        assert!(!track.sync);
        assert_eq!(track.status, "");
        assert_eq!(track.relative_path, "A/Album/song.mp3");
    }

    #[tokio::test]
    async fn test_upsert_preserves_user_owned_region() {
        let store = store().await;
        let first = store.upsert_track(&change("/m/a.mp3", "A")).await.unwrap();
        assert!(store.set_sync("/m/a.mp3", true).await.unwrap());

        let mut refresh = change("/m/a.mp3", "B");
        refresh.status = "Unreadable: bad header".to_string();
        let second = store.upsert_track(&refresh).await.unwrap();

        // System-owned region overwritten.
        assert_eq!(second.artist.as_deref(), Some("B"));
        assert_eq!(second.status, "Unreadable: bad header");
        // User-owned region untouched.
        assert!(second.sync);
        assert_eq!(second.added_at, first.added_at);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_mark_missing_skips_already_missing() {
        let store = store().await;
        store.upsert_track(&change("/m/a.mp3", "A")).await.unwrap();
        store.upsert_track(&change("/m/b.mp3", "B")).await.unwrap();

        let paths = vec!["/m/a.mp3".to_string(), "/m/b.mp3".to_string()];
        assert_eq!(store.mark_missing(&paths).await.unwrap(), 2);
        // Second sweep changes nothing.
        assert_eq!(store.mark_missing(&paths).await.unwrap(), 0);

        let track = store.find_by_path("/m/a.mp3").await.unwrap().unwrap();
        assert!(track.is_missing());
    }

    #[tokio::test]
    async fn test_reappearance_clears_missing_status() {
        let store = store().await;
        store.upsert_track(&change("/m/a.mp3", "A")).await.unwrap();
        store
            .mark_missing(&["/m/a.mp3".to_string()])
            .await
            .unwrap();

        let refreshed = store.upsert_track(&change("/m/a.mp3", "A")).await.unwrap();
        assert!(!refreshed.is_missing());
        assert_eq!(refreshed.status, "");
    }

    #[tokio::test]
    async fn test_query_sync_candidates_ordering() {
        let store = store().await;
        for (path, artist) in [("/m/1.mp3", "A"), ("/m/2.mp3", "B"), ("/m/3.mp3", "C")] {
            store.upsert_track(&change(path, artist)).await.unwrap();
        }
        store.set_sync("/m/3.mp3", true).await.unwrap();
        store.set_sync("/m/1.mp3", true).await.unwrap();

        let candidates = store.query_sync_candidates().await.unwrap();
        let paths: Vec<&str> = candidates.iter().map(|t| t.source_path.as_str()).collect();
        assert_eq!(paths, vec!["/m/1.mp3", "/m/3.mp3"]);
        assert!(candidates.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_set_sync_unknown_path() {
        let store = store().await;
        assert!(!store.set_sync("/nope", true).await.unwrap());
    }
}
