//! # Transfer Planner
//!
//! Turns sync-flagged catalog rows into a deterministic ordered plan.
//!
//! Selection rule: a row is planned iff its sync flag is set and it is not
//! `Missing` (an absent file cannot be pushed). Ordering is ascending row
//! identity, so an unchanged catalog always yields an identical plan.
//! Whether a file already present on the target is skipped is an adapter
//! decision, not a planner one.

use core_catalog::Track;

/// One file to place on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Catalog identity; `None` for generated files such as playlists.
    pub track_id: Option<i64>,
    /// Absolute local path to read from.
    pub source_path: String,
    /// Forward-slash layout below the destination root.
    pub relative_path: String,
    /// Full destination path on the target.
    pub dest_path: String,
}

/// Build the ordered transfer plan from catalog rows.
pub fn build_plan(rows: &[Track], dest_root: &str) -> Vec<PlanEntry> {
    let mut entries: Vec<PlanEntry> = rows
        .iter()
        .filter(|t| t.sync && !t.is_missing())
        .map(|t| PlanEntry {
            track_id: Some(t.id),
            source_path: t.source_path.clone(),
            relative_path: t.relative_path.clone(),
            dest_path: join_remote(dest_root, &t.relative_path),
        })
        .collect();
    entries.sort_by_key(|e| e.track_id);
    entries
}

/// Join a destination root and a relative path with forward slashes,
/// regardless of host OS conventions.
pub fn join_remote(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Directory part of a forward-slash destination path.
pub fn remote_parent(dest_path: &str) -> &str {
    match dest_path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &dest_path[..idx],
        None => "",
    }
}
