//! Error types shared by the store backend and the sync services.

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of the transfer step as a whole.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot prepare scan folder {}: {source}", path.display())]
    Prepare { path: PathBuf, source: io::Error },
    #[error("cannot enumerate scan folder {}: {source}", path.display())]
    Enumerate {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Why a single file did not make it through the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The local file could not be opened or named.
    Read,
    /// The store rejected or aborted the upload. The local file is kept.
    Upload,
    /// The upload succeeded but the local copy could not be removed.
    Delete,
}
