//! Catalog store trait.

use crate::error::Result;
use crate::models::{Track, TrackUpsert};
use async_trait::async_trait;

/// Persistent catalog interface.
///
/// Implementations must serialize writes to a given row; the scanner relies
/// on that to avoid lost updates when per-file work is parallelized.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new row or overwrite the system-owned region of an existing
    /// one. New rows get `sync = false` and `added_at = now`; existing rows
    /// keep both. Returns the stored row.
    async fn upsert_track(&self, change: &TrackUpsert) -> Result<Track>;

    /// Find a row by source path.
    async fn find_by_path(&self, source_path: &str) -> Result<Option<Track>>;

    /// All rows in ascending insertion order.
    async fn all_tracks(&self) -> Result<Vec<Track>>;

    /// Rows with the sync flag set, ascending insertion order. Includes
    /// rows currently marked `Missing`; the transfer planner filters those.
    async fn query_sync_candidates(&self) -> Result<Vec<Track>>;

    /// Set the given rows to the `Missing` status. Rows already `Missing`
    /// are left untouched. Returns the number of rows newly marked.
    async fn mark_missing(&self, source_paths: &[String]) -> Result<u64>;

    /// Flip the user-owned sync flag. Returns `false` when the path is
    /// unknown.
    async fn set_sync(&self, source_path: &str, sync: bool) -> Result<bool>;
}
