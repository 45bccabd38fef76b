//! # Settings Layer
//!
//! Typed scan/sync settings loaded from a read-only key/value store.
//!
//! ## Overview
//!
//! The core never writes settings; the embedding layer owns persistence and
//! exposes it through the [`SettingsStore`] trait. [`ScanSettings`] and
//! [`SyncSettings`] snapshot that store once per run, so a run never sees a
//! half-edited configuration.
//!
//! Setting keys follow the catalog owner's settings table:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `scan_paths` | JSON array of root directories (bare string accepted) | required |
//! | `target_exts` | comma list of allowed extensions | `mp3,mp4,m4a` |
//! | `exclude_dirs` | comma list of directory names to prune | empty |
//! | `full_refresh` | re-extract metadata for known files | `false` |
//! | `sync_mode` | `adb` \| `rsync` \| `ftp` | required for sync |
//! | `sync_dest` | destination root on the target | required for sync |
//! | `adb_serial` | device selector for the device bridge | none |
//! | `rsync_host` / `rsync_port` / `rsync_user` | remote shell parameters | `""` / `22` / none |
//! | `ftp_host` / `ftp_port` / `ftp_user` / `ftp_pass` | FTP parameters | required for `ftp` / `21` / required / required |
//! | `connect_timeout_secs` | bound on connection establishment | `20` |

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Read-only key/value settings source owned by the embedding layer.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Retrieve a string value.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Retrieve a boolean value.
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Retrieve an integer value.
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;
}

async fn required_string(store: &dyn SettingsStore, key: &str) -> Result<String> {
    match store.get_string(key).await? {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::MissingSetting(key.to_string())),
    }
}

fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Scan settings
// ============================================================================

/// Configuration for one scan run, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Root directories to enumerate.
    pub roots: Vec<PathBuf>,
    /// Directory names pruned from the walk (exact match).
    pub excluded_dirs: Vec<String>,
    /// Allowed file extensions, lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Re-extract metadata for files already in the catalog.
    pub full_refresh: bool,
}

impl ScanSettings {
    /// Load scan settings from the store.
    ///
    /// `scan_paths` is stored as a JSON array; a bare string is accepted for
    /// backward compatibility and treated as a single root.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingSetting` when `scan_paths` is absent or empty.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let raw_paths = required_string(store, "scan_paths").await?;
        let roots: Vec<PathBuf> = match serde_json::from_str::<Vec<String>>(&raw_paths) {
            Ok(list) => list.into_iter().map(PathBuf::from).collect(),
            Err(_) => {
                warn!("scan_paths is not a JSON array, treating as a single path");
                vec![PathBuf::from(raw_paths.trim())]
            }
        };
        if roots.is_empty() {
            return Err(Error::MissingSetting("scan_paths".to_string()));
        }

        let exts = store
            .get_string("target_exts")
            .await?
            .unwrap_or_else(|| "mp3,mp4,m4a".to_string());
        let allowed_extensions = split_comma_list(&exts);
        if allowed_extensions.is_empty() {
            return Err(Error::Config("target_exts resolves to an empty list".to_string()));
        }

        let excluded_dirs = store
            .get_string("exclude_dirs")
            .await?
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let full_refresh = store.get_bool("full_refresh").await?.unwrap_or(false);

        Ok(Self {
            roots,
            excluded_dirs,
            allowed_extensions,
            full_refresh,
        })
    }

    /// Whether a file name carries one of the allowed extensions
    /// (case-insensitive).
    pub fn allows_extension(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

// ============================================================================
// Sync settings
// ============================================================================

/// The transfer protocol selected for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Device bridge (adb push per file).
    DeviceBridge,
    /// Remote shell delta sync (rsync over ssh, or local rsync).
    RemoteShell,
    /// FTP session for the whole run.
    Ftp,
}

impl SyncMode {
    /// String representation used in the settings store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::DeviceBridge => "adb",
            SyncMode::RemoteShell => "rsync",
            SyncMode::Ftp => "ftp",
        }
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adb" => Ok(SyncMode::DeviceBridge),
            "rsync" => Ok(SyncMode::RemoteShell),
            "ftp" => Ok(SyncMode::Ftp),
            other => Err(Error::Config(format!("unknown sync_mode: {}", other))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Device bridge parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Device serial passed to `adb -s`; `None` targets the only device.
    pub serial: Option<String>,
}

/// Remote shell parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellSettings {
    /// Remote host. Empty means the destination is a local path and no
    /// remote-shell transport is used at all.
    pub host: String,
    /// SSH port, always passed explicitly.
    pub port: u16,
    /// Remote user; omitted from the target when not configured.
    pub user: Option<String>,
    /// Source roots handed to the delta-transfer tool, shared with the
    /// scanner's `scan_paths`.
    pub source_roots: Vec<String>,
}

/// FTP parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpSettings {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

/// Configuration for one sync run, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Selected transfer protocol.
    pub mode: SyncMode,
    /// Destination root on the target, forward-slash layout.
    pub dest_root: String,
    /// Bound on connection establishment; exceeding it is a connection
    /// failure, not a hang.
    pub connect_timeout_secs: u64,
    /// Device bridge parameters.
    pub device: DeviceSettings,
    /// Remote shell parameters.
    pub shell: ShellSettings,
    /// FTP parameters; present iff `mode` is [`SyncMode::Ftp`].
    pub ftp: Option<FtpSettings>,
}

impl SyncSettings {
    /// Load sync settings from the store.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingSetting` when `sync_mode`, `sync_dest`, or —
    /// in FTP mode — any of `ftp_host`/`ftp_user`/`ftp_pass` is absent, and
    /// `Error::Config` for malformed values (unknown mode, bad port).
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let mode: SyncMode = required_string(store, "sync_mode").await?.parse()?;
        let dest_root = required_string(store, "sync_dest").await?;

        let connect_timeout_secs = match store.get_i64("connect_timeout_secs").await? {
            Some(v) if v > 0 => v as u64,
            Some(v) => {
                return Err(Error::Config(format!(
                    "connect_timeout_secs must be positive, got {}",
                    v
                )))
            }
            None => 20,
        };

        let device = DeviceSettings {
            serial: store.get_string("adb_serial").await?.filter(|s| !s.trim().is_empty()),
        };

        let shell = ShellSettings {
            host: store.get_string("rsync_host").await?.unwrap_or_default(),
            port: port_setting(store, "rsync_port", 22).await?,
            user: store.get_string("rsync_user").await?.filter(|s| !s.trim().is_empty()),
            source_roots: match store.get_string("scan_paths").await? {
                Some(raw) => serde_json::from_str::<Vec<String>>(&raw)
                    .unwrap_or_else(|_| vec![raw.trim().to_string()]),
                None => Vec::new(),
            },
        };

        let ftp = if mode == SyncMode::Ftp {
            Some(FtpSettings {
                host: required_string(store, "ftp_host").await?,
                port: port_setting(store, "ftp_port", 21).await?,
                user: required_string(store, "ftp_user").await?,
                password: required_string(store, "ftp_pass").await?,
            })
        } else {
            None
        };

        Ok(Self {
            mode,
            dest_root,
            connect_timeout_secs,
            device,
            shell,
            ftp,
        })
    }
}

async fn port_setting(store: &dyn SettingsStore, key: &str, default: u16) -> Result<u16> {
    match store.get_i64(key).await? {
        Some(v) => {
            u16::try_from(v).map_err(|_| Error::Config(format!("{} out of range: {}", key, v)))
        }
        None => Ok(default),
    }
}

// ============================================================================
// In-memory store (test double)
// ============================================================================

/// In-memory [`SettingsStore`] used in tests and examples. All values are
/// kept as strings and coerced on read, mirroring how the persistent
/// settings table stores them.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    values: HashMap<String, String>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                other => Err(Error::Store(format!("not a boolean: {}", other))),
            },
            None => Ok(None),
        }
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.values.get(key) {
            Some(v) => v
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| Error::Store(format!("not an integer: {}", e))),
            None => Ok(None),
        }
    }
}
