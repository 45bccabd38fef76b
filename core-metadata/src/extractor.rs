//! Audio tag extraction.
//!
//! Reads tag fields from audio files using the `lofty` crate. Supports
//! ID3v2, MP4 tags, Vorbis Comments and FLAC.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{LoftyTagReader, TagReader};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = LoftyTagReader::new();
//! let tags = reader.extract(Path::new("song.mp3")).await?;
//! println!("Title: {}", tags.title.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};

/// Tag fields extracted from one audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTags {
    /// Track title; falls back to the file stem when the file has no tags.
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
    /// Duration in whole seconds.
    pub duration_secs: Option<i64>,
    /// Codec token, e.g. "mp3".
    pub codec: Option<String>,
    /// File size in bytes.
    pub file_size: Option<i64>,
}

/// Extraction seam for the scanner. Implementations fail per file; callers
/// record the failure on the row and continue.
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Extract tag fields from the file at `path`.
    async fn extract(&self, path: &Path) -> Result<AudioTags>;
}

/// `lofty`-backed tag reader.
pub struct LoftyTagReader {
    parse_options: ParseOptions,
}

impl LoftyTagReader {
    /// Create a reader with default parse options.
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    fn unreadable(path: &Path, reason: impl std::fmt::Display) -> MetadataError {
        MetadataError::UnreadableMedia {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Normalize tag text: collapse whitespace, strip control characters.
    fn normalize_text(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .filter(|c| !c.is_control())
            .collect()
    }

    /// Format a track number as "n" or "n/total".
    fn format_track_num(track: Option<u32>, total: Option<u32>) -> Option<String> {
        match (track, total) {
            (Some(n), Some(t)) if t > 0 => Some(format!("{}/{}", n, t)),
            (Some(n), _) => Some(n.to_string()),
            (None, _) => None,
        }
    }

    /// Map a lofty file type to the codec token stored in the catalog.
    fn codec_token(file_type: FileType) -> &'static str {
        match file_type {
            FileType::Mpeg => "mp3",
            FileType::Mp4 => "mp4",
            FileType::Flac => "flac",
            FileType::Opus => "opus",
            FileType::Vorbis => "ogg",
            FileType::Wav => "wav",
            FileType::Aac => "aac",
            FileType::Aiff => "aiff",
            FileType::Ape => "ape",
            FileType::WavPack => "wv",
            _ => "unknown",
        }
    }
}

impl Default for LoftyTagReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagReader for LoftyTagReader {
    async fn extract(&self, path: &Path) -> Result<AudioTags> {
        debug!("Extracting tags from: {}", path.display());

        let file_data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetadataError::FileNotFound(path.display().to_string())
            } else {
                Self::unreadable(path, e)
            }
        })?;
        let file_size = file_data.len() as i64;

        let tagged_file = Probe::new(std::io::Cursor::new(&file_data))
            .options(self.parse_options)
            .guess_file_type()
            .map_err(|e| Self::unreadable(path, e))?
            .read()
            .map_err(|e| Self::unreadable(path, e))?;

        let codec = Self::codec_token(tagged_file.file_type()).to_string();
        let duration_secs = tagged_file.properties().duration().as_secs() as i64;

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        let tags = if let Some(tag) = tag {
            AudioTags {
                title: tag.title().map(|s| Self::normalize_text(s.as_ref())),
                artist: tag.artist().map(|s| Self::normalize_text(s.as_ref())),
                album: tag.album().map(|s| Self::normalize_text(s.as_ref())),
                album_artist: tag
                    .get_string(&ItemKey::AlbumArtist)
                    .map(Self::normalize_text),
                composer: tag.get_string(&ItemKey::Composer).map(Self::normalize_text),
                track_num: Self::format_track_num(tag.track(), tag.track_total()),
                duration_secs: Some(duration_secs),
                codec: Some(codec),
                file_size: Some(file_size),
            }
        } else {
            warn!(
                "No tags found in {}, using file name as title",
                path.display()
            );
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string();
            AudioTags {
                title: Some(Self::normalize_text(&stem)),
                duration_secs: Some(duration_secs),
                codec: Some(codec),
                file_size: Some(file_size),
                ..Default::default()
            }
        };

        Ok(tags)
    }
}
