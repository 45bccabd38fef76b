//! Remote shell transport.
//!
//! Drives the `rsync` delta-transfer tool, over ssh when a remote host is
//! configured and directly against a local path otherwise. The tool is
//! stateless per invocation: the planned catalog files go out as one batch
//! built from an include list, and staged files outside the scan roots
//! (playlists) get one copy invocation each.
//!
//! Arguments are always passed as a vector, never interpolated into a shell
//! string.

use crate::adapters::{ProtocolAdapter, TransferStats};
use crate::error::{Result, SyncError};
use crate::planner::PlanEntry;
use async_trait::async_trait;
use core_runtime::config::{ShellSettings, SyncSettings};
use core_runtime::events::EventBus;
use std::collections::BTreeSet;
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct RemoteShellAdapter {
    shell: ShellSettings,
    dest_root: String,
}

impl RemoteShellAdapter {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            shell: settings.shell.clone(),
            dest_root: settings.dest_root.clone(),
        }
    }

    /// Run one rsync invocation, mirroring its output into the event
    /// stream, honoring cancellation.
    async fn run_tool(
        &self,
        args: &[String],
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(?args, "Invoking rsync");
        let mut child = Command::new("rsync")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let mut lines = stdout.map(|s| BufReader::new(s).lines());

        let status = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(SyncError::Cancelled);
                }
                line = async {
                    match lines.as_mut() {
                        Some(l) => l.next_line().await,
                        None => Ok(None),
                    }
                }, if lines.is_some() => {
                    match line {
                        Ok(Some(text)) => {
                            if !text.trim().is_empty() {
                                events.log(text);
                            }
                        }
                        _ => lines = None,
                    }
                }
                status = child.wait() => break status?,
            }
        };

        if !status.success() {
            return Err(SyncError::Transfer {
                path: self.dest_root.clone(),
                message: format!("rsync exited with {}", status),
            });
        }
        Ok(())
    }
}

/// `user@host:dest`, `host:dest`, or `None` when no host is configured and
/// the destination is a local path.
fn remote_target(shell: &ShellSettings, dest_root: &str) -> Option<String> {
    if shell.host.trim().is_empty() {
        return None;
    }
    Some(match &shell.user {
        Some(user) => format!("{}@{}:{}", user, shell.host, dest_root),
        None => format!("{}:{}", shell.host, dest_root),
    })
}

/// Batch invocation arguments. Ends with `["-e", "ssh -p <port>", target]`
/// for a remote destination and with the bare local path otherwise.
pub fn build_rsync_args(
    shell: &ShellSettings,
    dest_root: &str,
    include_file: &str,
) -> Vec<String> {
    let mut args = vec![
        "-avz".to_string(),
        "--delete-excluded".to_string(),
        "--include-from".to_string(),
        include_file.to_string(),
        "--exclude=*".to_string(),
    ];
    for root in &shell.source_roots {
        args.push(root.trim_end_matches('/').to_string());
    }
    match remote_target(shell, dest_root) {
        Some(target) => {
            args.push("-e".to_string());
            args.push(format!("ssh -p {}", shell.port));
            args.push(target);
        }
        None => args.push(dest_root.to_string()),
    }
    args
}

/// Single-file copy arguments for staged files outside the scan roots.
fn build_copy_args(shell: &ShellSettings, dest_root: &str, source: &str) -> Vec<String> {
    let mut args = vec!["-avz".to_string(), source.to_string()];
    let dest_dir = format!("{}/", dest_root.trim_end_matches('/'));
    match remote_target(shell, &dest_dir) {
        Some(target) => {
            args.push("-e".to_string());
            args.push(format!("ssh -p {}", shell.port));
            args.push(target);
        }
        None => args.push(dest_dir),
    }
    args
}

/// Split the plan into include patterns for entries under a scan root and
/// leftover entries that need individual copies. Each included file also
/// contributes its parent directory prefixes, which the include-from
/// traversal requires.
fn include_patterns(
    plan: &[PlanEntry],
    source_roots: &[String],
) -> (BTreeSet<String>, Vec<PlanEntry>) {
    let mut patterns = BTreeSet::new();
    let mut leftovers = Vec::new();

    'entries: for entry in plan {
        for root in source_roots {
            let root = root.trim_end_matches('/');
            if let Some(rest) = entry.source_path.strip_prefix(root) {
                if let Some(rel) = rest.strip_prefix('/') {
                    let mut prefix = String::new();
                    let segments: Vec<&str> = rel.split('/').collect();
                    for dir in &segments[..segments.len() - 1] {
                        prefix.push_str(dir);
                        prefix.push('/');
                        patterns.insert(prefix.clone());
                    }
                    patterns.insert(rel.to_string());
                    continue 'entries;
                }
            }
        }
        leftovers.push(entry.clone());
    }

    (patterns, leftovers)
}

#[async_trait]
impl ProtocolAdapter for RemoteShellAdapter {
    async fn connect(&mut self) -> Result<()> {
        // Stateless tool; reachability surfaces on the first invocation.
        Ok(())
    }

    async fn transfer(
        &mut self,
        plan: &[PlanEntry],
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        let (patterns, leftovers) = include_patterns(plan, &self.shell.source_roots);
        let batched = plan.len() - leftovers.len();

        if !patterns.is_empty() {
            let mut include_file = tempfile::NamedTempFile::new()?;
            for pattern in &patterns {
                writeln!(include_file, "{}", pattern)?;
            }
            include_file.flush()?;

            events.log(format!("Syncing {} files", batched));
            let args = build_rsync_args(
                &self.shell,
                &self.dest_root,
                &include_file.path().to_string_lossy(),
            );
            self.run_tool(&args, events, cancel).await?;
            stats.sent += batched as u64;
        }

        for entry in &leftovers {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            events.log(format!("Copying {}", entry.relative_path));
            let args = build_copy_args(&self.shell, &self.dest_root, &entry.source_path);
            match self.run_tool(&args, events, cancel).await {
                Ok(()) => stats.sent += 1,
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    stats.failed += 1;
                    events.log(format!("Copy failed for {}: {}", entry.relative_path, e));
                }
            }
        }

        Ok(stats)
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(host: &str, user: Option<&str>) -> ShellSettings {
        ShellSettings {
            host: host.to_string(),
            port: 22,
            user: user.map(String::from),
            source_roots: vec!["/a".to_string()],
        }
    }

    #[test]
    fn test_remote_invocation_shape() {
        let args = build_rsync_args(&shell("h", Some("u")), "/remote/music", "/tmp/include");
        assert!(args.contains(&"/a".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            ["-e", "ssh -p 22", "u@h:/remote/music"]
        );
    }

    #[test]
    fn test_local_invocation_shape() {
        let args = build_rsync_args(&shell("", None), "/local/backup", "/tmp/include");
        assert_eq!(args.last().unwrap(), "/local/backup");
        assert!(!args.contains(&"-e".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("ssh")));
    }

    #[test]
    fn test_target_omits_user_when_not_configured() {
        let args = build_rsync_args(&shell("h", None), "/d", "/tmp/include");
        assert_eq!(args.last().unwrap(), "h:/d");
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_transfer_before_any_invocation() {
        use core_runtime::config::{DeviceSettings, SyncMode};

        let settings = SyncSettings {
            mode: SyncMode::RemoteShell,
            dest_root: "/d".to_string(),
            connect_timeout_secs: 1,
            device: DeviceSettings::default(),
            shell: ShellSettings::default(),
            ftp: None,
        };
        let mut adapter = RemoteShellAdapter::new(&settings);

        let token = CancellationToken::new();
        token.cancel();
        // Outside any source root, so it would go out as an individual copy.
        let plan = vec![PlanEntry {
            track_id: None,
            source_path: "/tmp/stage/list.m3u8".to_string(),
            relative_path: "list.m3u8".to_string(),
            dest_path: "/d/list.m3u8".to_string(),
        }];

        match adapter.transfer(&plan, &EventBus::default(), &token).await {
            Err(SyncError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn test_include_patterns_cover_parent_dirs() {
        let plan = vec![
            PlanEntry {
                track_id: Some(1),
                source_path: "/a/Artist/Album/song.mp3".to_string(),
                relative_path: "Artist/Album/song.mp3".to_string(),
                dest_path: "/d/Artist/Album/song.mp3".to_string(),
            },
            PlanEntry {
                track_id: None,
                source_path: "/tmp/stage/list.m3u8".to_string(),
                relative_path: "list.m3u8".to_string(),
                dest_path: "/d/list.m3u8".to_string(),
            },
        ];
        let (patterns, leftovers) = include_patterns(&plan, &["/a".to_string()]);

        let expected: Vec<&str> = vec!["Artist/", "Artist/Album/", "Artist/Album/song.mp3"];
        assert_eq!(patterns.iter().map(String::as_str).collect::<Vec<_>>(), expected);
        assert_eq!(leftovers.len(), 1);
        assert_eq!(leftovers[0].relative_path, "list.m3u8");
    }
}
