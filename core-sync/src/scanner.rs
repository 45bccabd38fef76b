//! # Scanner
//!
//! Reconciles the catalog against filesystem truth.
//!
//! ## Overview
//!
//! One scan pass walks the configured roots, prunes excluded directories,
//! and keeps files whose extension is on the allow-list. Each surviving path
//! is reconciled against the catalog:
//!
//! - unknown path: extract tags and insert the row
//! - known path, incremental mode: marked as seen without re-extraction
//! - known path, full refresh or previously `Missing`: re-extract and
//!   overwrite the system-owned region
//!
//! After the pass, every catalog row whose file was not seen is set to
//! `Missing`. The user-owned region (sync flag, added date) is never touched.
//!
//! Per-file failures are recorded on the row and the scan continues; a root
//! that cannot be enumerated at all costs one error log line and the other
//! roots still proceed.

use crate::error::Result;
use core_catalog::{CatalogStore, TrackUpsert};
use core_metadata::{AudioTags, TagReader};
use core_runtime::config::ScanSettings;
use core_runtime::events::EventBus;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows inserted this pass.
    pub added: u64,
    /// Rows whose metadata was re-extracted this pass.
    pub updated: u64,
    /// Rows newly marked `Missing` this pass.
    pub missing: u64,
}

/// Filesystem-to-catalog reconciliation.
pub struct Scanner {
    catalog: Arc<dyn CatalogStore>,
    tags: Arc<dyn TagReader>,
    events: EventBus,
}

impl Scanner {
    pub fn new(catalog: Arc<dyn CatalogStore>, tags: Arc<dyn TagReader>, events: EventBus) -> Self {
        Self {
            catalog,
            tags,
            events,
        }
    }

    /// Run one scan pass over the configured roots.
    ///
    /// # Errors
    ///
    /// Only catalog failures abort the pass. Extraction and per-file IO
    /// errors are recorded on the affected row and the pass continues.
    pub async fn run_scan(&self, settings: &ScanSettings) -> Result<ScanStats> {
        info!(roots = settings.roots.len(), full_refresh = settings.full_refresh, "Scan started");

        let existing = self.load_existing().await?;
        let candidates = self.enumerate(settings);
        let total = candidates.len();
        self.events.log(format!("Found {} files to examine", total));

        let mut stats = ScanStats::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(total);

        for (index, path) in candidates.iter().enumerate() {
            let source_path = path.to_string_lossy().to_string();
            seen.insert(source_path.clone());

            match existing.get(&source_path) {
                Some((_, is_missing)) if !settings.full_refresh && !is_missing => {
                    // Known and present; incremental mode skips re-extraction.
                    debug!(path = %source_path, "Seen, not refreshed");
                }
                known => {
                    let is_new = known.is_none();
                    self.refresh_file(path, &source_path, is_new).await?;
                    if is_new {
                        stats.added += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
            }

            if (index + 1) % 10 == 0 {
                self.events.progress(((index + 1) * 100 / total.max(1)) as u8);
            }
        }

        let unseen: Vec<String> = existing
            .keys()
            .filter(|p| !seen.contains(*p))
            .cloned()
            .collect();
        if !unseen.is_empty() {
            stats.missing = self.catalog.mark_missing(&unseen).await?;
            if stats.missing > 0 {
                self.events
                    .log(format!("Marked {} files as missing", stats.missing));
            }
        }

        self.events.progress(100);
        info!(
            added = stats.added,
            updated = stats.updated,
            missing = stats.missing,
            "Scan finished"
        );
        Ok(stats)
    }

    async fn load_existing(&self) -> Result<HashMap<String, (i64, bool)>> {
        let rows = self.catalog.all_tracks().await?;
        Ok(rows
            .into_iter()
            .map(|t| (t.source_path.clone(), (t.id, t.is_missing())))
            .collect())
    }

    /// Enumerate candidate files under every root. A root that cannot be
    /// walked is reported and skipped; the others still contribute.
    fn enumerate(&self, settings: &ScanSettings) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in &settings.roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "Scan root is not a directory");
                self.events
                    .log(format!("Cannot enumerate root: {}", root.display()));
                continue;
            }

            let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !settings.excluded_dirs.iter().any(|d| d == name.as_ref())
            });

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let allowed = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| settings.allows_extension(e))
                    .unwrap_or(false);
                if allowed {
                    files.push(entry.into_path());
                }
            }
        }

        files
    }

    /// Extract tags for one file and upsert the row. Extraction failure is
    /// absorbed: the row keeps an error note and a filename-derived layout.
    async fn refresh_file(&self, path: &Path, source_path: &str, is_new: bool) -> Result<()> {
        let upsert = match self.tags.extract(path).await {
            Ok(tags) => TrackUpsert {
                source_path: source_path.to_string(),
                relative_path: relative_destination(&tags, path),
                title: tags.title,
                artist: tags.artist,
                album: tags.album,
                album_artist: tags.album_artist,
                composer: tags.composer,
                track_num: tags.track_num,
                duration_secs: tags.duration_secs,
                codec: tags.codec,
                file_size: tags.file_size,
                status: String::new(),
            },
            Err(e) => {
                warn!(path = %source_path, error = %e, "Tag extraction failed");
                self.events
                    .log(format!("Failed to read {}: {}", source_path, e));
                TrackUpsert {
                    source_path: source_path.to_string(),
                    relative_path: file_name_segment(path),
                    title: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string()),
                    status: format!("Unreadable: {}", e),
                    ..Default::default()
                }
            }
        };

        let had_error = !upsert.status.is_empty();
        self.catalog.upsert_track(&upsert).await?;
        if is_new && !had_error {
            self.events.log(format!("Added: {}", source_path));
        }
        Ok(())
    }
}

/// Compute the forward-slash layout of a file on the target:
/// `<album artist | artist | "Unknown Artist">/<album | "Unknown Album">/<file name>`.
///
/// Files carrying no artist and no album at all fall back to the bare file
/// name at the destination root.
pub fn relative_destination(tags: &AudioTags, source: &Path) -> String {
    let file_name = file_name_segment(source);

    let artist = tags
        .album_artist
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| tags.artist.as_deref().filter(|s| !s.trim().is_empty()));
    let album = tags.album.as_deref().filter(|s| !s.trim().is_empty());

    if artist.is_none() && album.is_none() {
        return file_name;
    }

    format!(
        "{}/{}/{}",
        sanitize_segment(artist.unwrap_or("Unknown Artist")),
        sanitize_segment(album.unwrap_or("Unknown Album")),
        file_name
    )
}

fn file_name_segment(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Make a tag value safe as a single path segment on any target.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(artist: Option<&str>, album_artist: Option<&str>, album: Option<&str>) -> AudioTags {
        AudioTags {
            artist: artist.map(String::from),
            album_artist: album_artist.map(String::from),
            album: album.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_relative_destination_prefers_album_artist() {
        let t = tags(Some("Feat Artist"), Some("Band"), Some("Album"));
        assert_eq!(
            relative_destination(&t, Path::new("/music/song.mp3")),
            "Band/Album/song.mp3"
        );
    }

    #[test]
    fn test_relative_destination_fills_unknown_segments() {
        let t = tags(Some("Band"), None, None);
        assert_eq!(
            relative_destination(&t, Path::new("/music/song.mp3")),
            "Band/Unknown Album/song.mp3"
        );

        let t = tags(None, None, Some("Album"));
        assert_eq!(
            relative_destination(&t, Path::new("/music/song.mp3")),
            "Unknown Artist/Album/song.mp3"
        );
    }

    #[test]
    fn test_relative_destination_bare_filename_fallback() {
        let t = tags(None, None, None);
        assert_eq!(
            relative_destination(&t, Path::new("/music/song.mp3")),
            "song.mp3"
        );
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("AC/DC"), "AC_DC");
        assert_eq!(sanitize_segment("  What? "), "What_");
        assert_eq!(sanitize_segment("..."), "Unknown");
        assert_eq!(sanitize_segment("Plain Name"), "Plain Name");
    }
}
