//! # Sync Module
//!
//! Reconciles a persistent audio catalog against the filesystem and pushes
//! the selected subset to a remote target.
//!
//! ## Overview
//!
//! - [`scanner::Scanner`] walks the configured roots and reconciles what it
//!   finds into the catalog, preserving user-owned row state
//! - [`planner::build_plan`] turns sync-flagged rows into a deterministic
//!   ordered transfer plan
//! - [`adapters`] carry the plan over one of three transports: device
//!   bridge, remote shell delta sync, or FTP
//! - [`coordinator::RunCoordinator`] serializes runs, owns the
//!   Idle/Running/Completed/Failed state machine, and streams progress
//!   through the shared event bus
//!
//! ## Architecture
//!
//! ```text
//! RunCoordinator
//!   +-- Scanner ----> TagReader + CatalogStore
//!   +-- build_plan -> CatalogStore
//!   +-- ProtocolAdapter (device bridge | remote shell | ftp)
//!   +-- EventBus (fire-and-forget progress/log stream)
//! ```

pub mod adapters;
pub mod coordinator;
pub mod error;
pub mod planner;
pub mod playlist;
pub mod scanner;

pub use adapters::{
    create_adapter, DeviceBridgeAdapter, FtpAdapter, ProtocolAdapter, RemoteShellAdapter,
    TransferStats,
};
pub use coordinator::{RunCoordinator, RunId, RunKind, RunState};
pub use error::{Result, SyncError};
pub use planner::{build_plan, PlanEntry};
pub use playlist::{render_m3u8, PlaylistInput};
pub use scanner::{ScanStats, Scanner};
