use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Adapter setup failure, fatal for the whole run. No file transfer is
    /// attempted once this is raised.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A transfer failure the run could not absorb per-file.
    #[error("Transfer failed for {path}: {message}")]
    Transfer { path: String, message: String },

    /// A run was requested while another run was active. Rejected
    /// synchronously, never queued.
    #[error("Another run is already in progress")]
    ConcurrentRun,

    /// Missing or malformed settings, raised before the run starts.
    #[error("Configuration error: {0}")]
    Configuration(#[from] core_runtime::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] core_catalog::CatalogError),

    /// The run was cancelled from outside.
    #[error("Run cancelled")]
    Cancelled,

    /// The run exceeded its overall deadline.
    #[error("Run timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
