//! FTP transport.
//!
//! One authenticated session carries the whole run. The protocol client is
//! blocking, so every session operation is shuffled onto the blocking pool;
//! the session moves into the closure and back out so it survives individual
//! failures and can always be released in `finalize`.
//!
//! Remote directories are created lazily per file, tolerating "already
//! exists". A file the server already holds at full size is skipped.

use crate::adapters::{ProtocolAdapter, TransferStats};
use crate::error::{Result, SyncError};
use crate::planner::{remote_parent, PlanEntry};
use async_trait::async_trait;
use core_runtime::config::{FtpSettings, SyncSettings};
use core_runtime::events::EventBus;
use std::collections::HashSet;
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct FtpAdapter {
    settings: FtpSettings,
    connect_timeout: Duration,
    session: Option<FtpStream>,
    created_dirs: HashSet<String>,
}

impl FtpAdapter {
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let ftp = settings.ftp.clone().ok_or_else(|| {
            SyncError::Configuration(core_runtime::Error::MissingSetting("ftp_host".to_string()))
        })?;
        Ok(Self {
            settings: ftp,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            session: None,
            created_dirs: HashSet::new(),
        })
    }

    /// Run one blocking session operation, moving the session into the
    /// blocking pool and back.
    async fn with_session<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> suppaftp::FtpResult<T> + Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| SyncError::Connection("no active session".to_string()))?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| SyncError::Connection(format!("session task failed: {}", e)))?;
        self.session = Some(session);
        result.map_err(|e| SyncError::Transfer {
            path: String::new(),
            message: e.to_string(),
        })
    }

    /// Create every missing ancestor of `dest_path`, tolerating servers
    /// that report "already exists" as an error.
    async fn ensure_dirs(&mut self, dest_path: &str) -> Result<()> {
        let parent = remote_parent(dest_path).to_string();
        if parent.is_empty() || self.created_dirs.contains(&parent) {
            return Ok(());
        }

        let mut prefix = String::new();
        for segment in parent.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            if self.created_dirs.contains(&prefix) {
                continue;
            }
            let dir = prefix.clone();
            let made = self.with_session(move |s| s.mkdir(&dir)).await;
            if let Err(e) = made {
                debug!(dir = %prefix, "mkdir: {}", e);
            }
            self.created_dirs.insert(prefix.clone());
        }
        self.created_dirs.insert(parent);
        Ok(())
    }
}

#[async_trait]
impl ProtocolAdapter for FtpAdapter {
    async fn connect(&mut self) -> Result<()> {
        let host = self.settings.host.clone();
        let port = self.settings.port;
        let user = self.settings.user.clone();
        let password = self.settings.password.clone();
        let timeout = self.connect_timeout;

        let session = tokio::task::spawn_blocking(move || -> Result<FtpStream> {
            let addr = (host.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| SyncError::Connection(format!("cannot resolve {}: {}", host, e)))?
                .next()
                .ok_or_else(|| SyncError::Connection(format!("no address for {}", host)))?;

            let mut stream = FtpStream::connect_timeout(addr, timeout)
                .map_err(|e| SyncError::Connection(format!("connect failed: {}", e)))?;
            stream
                .login(&user, &password)
                .map_err(|e| SyncError::Connection(format!("login failed: {}", e)))?;
            stream
                .transfer_type(FileType::Binary)
                .map_err(|e| SyncError::Connection(format!("binary mode failed: {}", e)))?;
            Ok(stream)
        })
        .await
        .map_err(|e| SyncError::Connection(format!("session task failed: {}", e)))??;

        debug!(host = %self.settings.host, "FTP session established");
        self.session = Some(session);
        Ok(())
    }

    async fn transfer(
        &mut self,
        plan: &[PlanEntry],
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let mut stats = TransferStats::default();

        for entry in plan {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            events.log(format!("Storing {}", entry.relative_path));

            let local_size = std::fs::metadata(&entry.source_path).map(|m| m.len());
            let dest = entry.dest_path.clone();
            if let (Ok(size), Ok(remote)) = (
                &local_size,
                self.with_session(move |s| s.size(&dest)).await,
            ) {
                if remote as u64 == *size {
                    stats.skipped += 1;
                    events.log(format!("Already present: {}", entry.relative_path));
                    continue;
                }
            }

            self.ensure_dirs(&entry.dest_path).await?;

            let source = entry.source_path.clone();
            let dest = entry.dest_path.clone();
            let stored = self
                .with_session(move |s| {
                    let mut file = std::fs::File::open(&source)
                        .map_err(|e| suppaftp::FtpError::ConnectionError(e))?;
                    s.put_file(&dest, &mut file)
                })
                .await;

            match stored {
                Ok(_) => {
                    stats.sent += 1;
                    events.log(format!("Stored {}", entry.relative_path));
                }
                Err(SyncError::Connection(e)) => {
                    // The session itself is gone; nothing further can send.
                    return Err(SyncError::Connection(e));
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(path = %entry.relative_path, "Store failed: {}", e);
                    events.log(format!("Store failed for {}: {}", entry.relative_path, e));
                }
            }
        }

        Ok(stats)
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            let quit = tokio::task::spawn_blocking(move || session.quit()).await;
            match quit {
                Ok(Ok(())) => debug!("FTP session closed"),
                Ok(Err(e)) => debug!("FTP quit failed: {}", e),
                Err(e) => debug!("FTP quit task failed: {}", e),
            }
        }
        Ok(())
    }
}
