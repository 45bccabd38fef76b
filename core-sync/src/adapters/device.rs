//! Device bridge transport.
//!
//! Pushes files one at a time through the platform debug bridge (`adb`).
//! There is no persistent session: reachability is probed once up front,
//! then each file gets its own `push` invocation. Destination directories
//! are pre-created with `shell mkdir -p` before the first file in them.
//! A file already present at its destination path is skipped, so repeat
//! runs only push what the device lacks.

use crate::adapters::{ProtocolAdapter, TransferStats};
use crate::error::{Result, SyncError};
use crate::planner::{remote_parent, PlanEntry};
use async_trait::async_trait;
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct DeviceBridgeAdapter {
    serial: Option<String>,
    connect_timeout: Duration,
    created_dirs: HashSet<String>,
}

impl DeviceBridgeAdapter {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            serial: settings.device.serial.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            created_dirs: HashSet::new(),
        }
    }

    async fn run_bridge(&self, args: &[String]) -> Result<std::process::Output> {
        let output = Command::new("adb")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }
}

/// Leading arguments selecting the device, shared by every invocation.
fn base_args(serial: Option<&str>) -> Vec<String> {
    match serial {
        Some(s) => vec!["-s".to_string(), s.to_string()],
        None => Vec::new(),
    }
}

/// Arguments for the reachability probe.
fn probe_args(serial: Option<&str>) -> Vec<String> {
    let mut args = base_args(serial);
    args.push("get-state".to_string());
    args
}

/// Arguments probing one destination path for presence.
fn ls_args(serial: Option<&str>, path: &str) -> Vec<String> {
    let mut args = base_args(serial);
    args.extend(["shell", "ls"].map(String::from));
    args.push(path.to_string());
    args
}

/// Arguments pre-creating one destination directory.
fn mkdir_args(serial: Option<&str>, dir: &str) -> Vec<String> {
    let mut args = base_args(serial);
    args.extend(["shell", "mkdir", "-p"].map(String::from));
    args.push(dir.to_string());
    args
}

/// Arguments pushing one file.
fn push_args(serial: Option<&str>, source: &str, dest: &str) -> Vec<String> {
    let mut args = base_args(serial);
    args.push("push".to_string());
    args.push(source.to_string());
    args.push(dest.to_string());
    args
}

fn stderr_line(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .next()
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl ProtocolAdapter for DeviceBridgeAdapter {
    async fn connect(&mut self) -> Result<()> {
        let args = probe_args(self.serial.as_deref());
        let probe = tokio::time::timeout(self.connect_timeout, self.run_bridge(&args))
            .await
            .map_err(|_| {
                SyncError::Connection(format!(
                    "device probe timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })??;

        let state = String::from_utf8_lossy(&probe.stdout).trim().to_string();
        if !probe.status.success() || state != "device" {
            return Err(SyncError::Connection(format!(
                "device not ready: {}",
                if state.is_empty() {
                    stderr_line(&probe)
                } else {
                    state
                }
            )));
        }
        debug!(serial = ?self.serial, "Device ready");
        Ok(())
    }

    async fn transfer(
        &mut self,
        plan: &[PlanEntry],
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        let serial = self.serial.clone();

        for entry in plan {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let probe = self
                .run_bridge(&ls_args(serial.as_deref(), &entry.dest_path))
                .await?;
            if probe.status.success() {
                stats.skipped += 1;
                events.log(format!("Already present: {}", entry.relative_path));
                continue;
            }

            events.log(format!("Pushing {}", entry.relative_path));

            let dir = remote_parent(&entry.dest_path).to_string();
            if !dir.is_empty() && !self.created_dirs.contains(&dir) {
                let mkdir = self.run_bridge(&mkdir_args(serial.as_deref(), &dir)).await?;
                if mkdir.status.success() {
                    self.created_dirs.insert(dir);
                } else {
                    warn!(dir = %dir, "mkdir on device failed: {}", stderr_line(&mkdir));
                }
            }

            let push = self
                .run_bridge(&push_args(
                    serial.as_deref(),
                    &entry.source_path,
                    &entry.dest_path,
                ))
                .await?;
            if push.status.success() {
                stats.sent += 1;
                events.log(format!("Pushed {}", entry.relative_path));
            } else {
                stats.failed += 1;
                events.log(format!(
                    "Push failed for {}: {}",
                    entry.relative_path,
                    stderr_line(&push)
                ));
            }
        }

        Ok(stats)
    }

    async fn finalize(&mut self) -> Result<()> {
        // No session to release.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_target_path() {
        let args = push_args(
            None,
            "/music/song.mp3",
            &crate::planner::join_remote("/sdcard/Music", "Artist/Album/song.mp3"),
        );
        assert_eq!(
            args,
            vec!["push", "/music/song.mp3", "/sdcard/Music/Artist/Album/song.mp3"]
        );
    }

    #[test]
    fn test_serial_selects_device() {
        assert_eq!(
            probe_args(Some("emulator-5554")),
            vec!["-s", "emulator-5554", "get-state"]
        );
        assert_eq!(probe_args(None), vec!["get-state"]);
    }

    #[test]
    fn test_mkdir_args() {
        assert_eq!(
            mkdir_args(None, "/sdcard/Music/Artist/Album"),
            vec!["shell", "mkdir", "-p", "/sdcard/Music/Artist/Album"]
        );
    }

    #[test]
    fn test_presence_probe_args() {
        assert_eq!(
            ls_args(Some("emulator-5554"), "/sdcard/Music/Artist/Album/song.mp3"),
            vec!["-s", "emulator-5554", "shell", "ls", "/sdcard/Music/Artist/Album/song.mp3"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_transfer_before_any_invocation() {
        use core_runtime::config::{DeviceSettings, ShellSettings, SyncMode};

        let settings = SyncSettings {
            mode: SyncMode::DeviceBridge,
            dest_root: "/sdcard/Music".to_string(),
            connect_timeout_secs: 1,
            device: DeviceSettings::default(),
            shell: ShellSettings::default(),
            ftp: None,
        };
        let mut adapter = DeviceBridgeAdapter::new(&settings);

        let token = CancellationToken::new();
        token.cancel();
        let plan = vec![PlanEntry {
            track_id: Some(1),
            source_path: "/music/a.mp3".to_string(),
            relative_path: "A/a.mp3".to_string(),
            dest_path: "/sdcard/Music/A/a.mp3".to_string(),
        }];

        match adapter.transfer(&plan, &EventBus::default(), &token).await {
            Err(SyncError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
    }
}
