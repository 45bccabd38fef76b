//! # Protocol Adapters
//!
//! Three transfer transports behind one capability contract:
//!
//! | Variant | Session model |
//! |---|---|
//! | [`DeviceBridgeAdapter`] | none; one push invocation per file |
//! | [`RemoteShellAdapter`] | stateless; one delta-transfer invocation per batch |
//! | [`FtpAdapter`] | one authenticated session for the whole run |
//!
//! The variant is selected from the configured [`SyncMode`] at run start.
//! Connection or setup failure aborts the run before any file is attempted;
//! a single file's failure is recorded and the run continues; no file is
//! ever retried automatically.

use crate::error::Result;
use crate::planner::PlanEntry;
use async_trait::async_trait;
use core_runtime::config::{SyncMode, SyncSettings};
use core_runtime::events::EventBus;
use tokio_util::sync::CancellationToken;

mod device;
mod ftp;
mod shell;

pub use device::DeviceBridgeAdapter;
pub use ftp::FtpAdapter;
pub use shell::RemoteShellAdapter;

/// Per-file outcome counters for one transfer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Files placed on the target this run.
    pub sent: u64,
    /// Files whose transfer failed and was recorded.
    pub failed: u64,
    /// Files the adapter found already present and left alone.
    pub skipped: u64,
}

/// Uniform transfer contract implemented by each transport.
#[async_trait]
pub trait ProtocolAdapter: Send {
    /// Establish whatever session or reachability the transport needs.
    ///
    /// # Errors
    ///
    /// `SyncError::Connection` when the target is unreachable, refuses
    /// authentication, or the attempt exceeds the configured bound. Nothing
    /// is transferred after this fails.
    async fn connect(&mut self) -> Result<()>;

    /// Transfer the plan in order, emitting a log line per file at start
    /// and at outcome, checking `cancel` between files.
    async fn transfer(
        &mut self,
        plan: &[PlanEntry],
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<TransferStats>;

    /// Release any session resource. Called even after a failed transfer.
    async fn finalize(&mut self) -> Result<()>;
}

/// Select and construct the adapter for the configured mode.
pub fn create_adapter(settings: &SyncSettings) -> Result<Box<dyn ProtocolAdapter>> {
    Ok(match settings.mode {
        SyncMode::DeviceBridge => Box::new(DeviceBridgeAdapter::new(settings)),
        SyncMode::RemoteShell => Box::new(RemoteShellAdapter::new(settings)),
        SyncMode::Ftp => Box::new(FtpAdapter::new(settings)?),
    })
}
