use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Unreadable media file {path}: {reason}")]
    UnreadableMedia { path: String, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
