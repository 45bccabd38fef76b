//! Playlist rendering.
//!
//! Playlists selected for a sync run are rendered to extended M3U and staged
//! in a temporary directory, then appended to the transfer plan like any
//! other file. Entry paths are the same relative layout the tracks land
//! under, so players on the target resolve them next to the files.

use crate::planner::{join_remote, PlanEntry};
use crate::scanner::sanitize_segment;
use core_catalog::Track;
use std::path::Path;

/// A named playlist and its member tracks, in playback order.
#[derive(Debug, Clone)]
pub struct PlaylistInput {
    pub name: String,
    pub tracks: Vec<Track>,
}

/// Render a playlist to extended M3U text.
pub fn render_m3u8(playlist: &PlaylistInput) -> String {
    let mut out = String::from("#EXTM3U\n\n");
    for track in &playlist.tracks {
        let title = track
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| track.file_name());
        out.push_str(&format!(
            "#EXTINF:-1,{}\n{}\n\n",
            title,
            track.relative_path.trim_start_matches('/')
        ));
    }
    out
}

/// Write each playlist to `<stage_dir>/<name>.m3u8` and return plan entries
/// that place them at the destination root.
pub fn materialize_playlists(
    playlists: &[PlaylistInput],
    stage_dir: &Path,
    dest_root: &str,
) -> std::io::Result<Vec<PlanEntry>> {
    let mut entries = Vec::with_capacity(playlists.len());
    for playlist in playlists {
        let file_name = format!("{}.m3u8", sanitize_segment(&playlist.name));
        let path = stage_dir.join(&file_name);
        std::fs::write(&path, render_m3u8(playlist))?;
        entries.push(PlanEntry {
            track_id: None,
            source_path: path.to_string_lossy().to_string(),
            relative_path: file_name.clone(),
            dest_path: join_remote(dest_root, &file_name),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn track(title: Option<&str>, relative_path: &str) -> Track {
        Track {
            id: 1,
            source_path: "/music/a.mp3".to_string(),
            title: title.map(String::from),
            artist: None,
            album: None,
            album_artist: None,
            composer: None,
            track_num: None,
            duration_secs: None,
            codec: None,
            file_size: None,
            relative_path: relative_path.to_string(),
            sync: true,
            status: String::new(),
            added_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_m3u8() {
        let playlist = PlaylistInput {
            name: "Drive".to_string(),
            tracks: vec![
                track(Some("First"), "/A/B/first.mp3"),
                track(None, "A/B/second.mp3"),
            ],
        };
        let text = render_m3u8(&playlist);
        assert_eq!(
            text,
            "#EXTM3U\n\n#EXTINF:-1,First\nA/B/first.mp3\n\n#EXTINF:-1,second.mp3\nA/B/second.mp3\n\n"
        );
    }

    #[test]
    fn test_materialize_playlists() {
        let dir = tempfile::tempdir().unwrap();
        let playlists = vec![PlaylistInput {
            name: "Road/Trip".to_string(),
            tracks: vec![track(Some("One"), "A/one.mp3")],
        }];

        let entries = materialize_playlists(&playlists, dir.path(), "/sdcard/Music").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, "Road_Trip.m3u8");
        assert_eq!(entries[0].dest_path, "/sdcard/Music/Road_Trip.m3u8");
        assert!(entries[0].track_id.is_none());

        let written = std::fs::read_to_string(&entries[0].source_path).unwrap();
        assert!(written.starts_with("#EXTM3U"));
        assert!(written.contains("A/one.mp3"));
    }
}
