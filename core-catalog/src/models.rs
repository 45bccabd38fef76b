//! Catalog data models.
//!
//! A [`Track`] row is two merged regions:
//! - **system-owned**: tag metadata, `relative_path`, `status`, `updated_at`
//!   — fully overwritten on every metadata refresh;
//! - **user-owned**: the `sync` flag and `added_at` — never touched by a
//!   scan, only by the embedding layer on behalf of the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status value for a source file absent from the filesystem as of the last
/// scan. Any other non-empty status is an extraction-error note.
pub const STATUS_MISSING: &str = "Missing";

/// One catalog row. Identity is `source_path`, immutable once created;
/// `id` is the ascending insertion identity used for deterministic plan
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// Insertion identity (rowid), ascending.
    pub id: i64,
    /// Absolute source path, unique.
    pub source_path: String,
    /// Track title.
    pub title: Option<String>,
    /// Primary artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Album artist (compilations).
    pub album_artist: Option<String>,
    /// Composer.
    pub composer: Option<String>,
    /// Track number, "n" or "n/total".
    pub track_num: Option<String>,
    /// Duration in seconds.
    pub duration_secs: Option<i64>,
    /// Codec token, e.g. "mp3".
    pub codec: Option<String>,
    /// Source file size in bytes.
    pub file_size: Option<i64>,
    /// Forward-slash path appended to a destination root to place the file
    /// on the target. Recomputed from metadata, never hand-edited.
    pub relative_path: String,
    /// User-owned: include this track in sync runs.
    pub sync: bool,
    /// Empty, `Missing`, or an extraction-error note.
    pub status: String,
    /// User-owned: set once at first insertion.
    pub added_at: DateTime<Utc>,
    /// Set on every metadata refresh.
    pub updated_at: DateTime<Utc>,
}

impl Track {
    /// Whether the source file was absent as of the last scan.
    pub fn is_missing(&self) -> bool {
        self.status == STATUS_MISSING
    }

    /// File name segment of the relative destination path.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// System-owned region of a row, as produced by one scan pass. Upserting
/// this against the store inserts a new row (with `sync = false` and
/// `added_at = now`) or overwrites the system-owned region of an existing
/// one, leaving the user-owned region intact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackUpsert {
    /// Absolute source path, the row key.
    pub source_path: String,
    /// Track title.
    pub title: Option<String>,
    /// Primary artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Album artist.
    pub album_artist: Option<String>,
    /// Composer.
    pub composer: Option<String>,
    /// Track number, "n" or "n/total".
    pub track_num: Option<String>,
    /// Duration in seconds.
    pub duration_secs: Option<i64>,
    /// Codec token.
    pub codec: Option<String>,
    /// Source file size in bytes.
    pub file_size: Option<i64>,
    /// Recomputed relative destination path.
    pub relative_path: String,
    /// Empty to clear, or an extraction-error note.
    pub status: String,
}

impl TrackUpsert {
    /// Validate invariants before the row reaches the store.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.source_path.trim().is_empty() {
            return Err("source_path must not be empty".to_string());
        }
        if self.relative_path.trim().is_empty() {
            return Err("relative_path must not be empty".to_string());
        }
        if self.status == STATUS_MISSING {
            // A scan only upserts files it has just seen on disk.
            return Err("upsert cannot set the Missing status".to_string());
        }
        Ok(())
    }
}
