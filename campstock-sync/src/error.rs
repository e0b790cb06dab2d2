//! Error types for the local store and sync coordinator

use thiserror::Error;

use crate::record::RecordId;

/// Coarse failure category, used by callers to decide how to notify the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The local medium rejected a read or write.
    StorageFailure,
    /// A point lookup referenced a nonexistent record.
    NotFound,
    /// A remote upload did not succeed.
    UploadFailure,
    /// A manual sync was requested while offline.
    OfflineRefusal,
    /// The caller supplied something unusable.
    InvalidInput,
    /// Anything else.
    Internal,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored record {id} is unreadable: {reason}")]
    CorruptRecord { id: RecordId, reason: String },

    #[error("Record {0} not found")]
    NotFound(RecordId),

    #[error("Upload of record {id} failed: {reason}")]
    Upload { id: RecordId, reason: String },

    #[error("No internet connection")]
    Offline,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Database(_) | SyncError::CorruptRecord { .. } | SyncError::Io(_) => {
                ErrorKind::StorageFailure
            }
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Upload { .. } => ErrorKind::UploadFailure,
            SyncError::Offline => ErrorKind::OfflineRefusal,
            SyncError::InvalidRecord(_) | SyncError::Config(_) => ErrorKind::InvalidInput,
            SyncError::Serialization(_) | SyncError::Export(_) => ErrorKind::Internal,
        }
    }

    /// True for lookups that missed; callers usually treat these as a no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Export(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
