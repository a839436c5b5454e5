//! Moves files from the local staging folder into the object store.
//!
//! Each file is handled on its own: it is uploaded under its path relative to
//! the staging root and removed locally only once the store confirmed the
//! upload. A failure on one file never stops the others.

use crate::{
    errors::{FailureReason, TransferError},
    models::local_file::LocalFileEntry,
    services::object_store::{ByteStream, ObjectStore},
};
use futures::StreamExt;
use std::{path::Path, sync::Arc};
use tokio::fs::{self, File};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub relative_path: String,
    pub reason: FailureReason,
    pub message: String,
}

/// Outcome of one scan-and-upload pass.
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Number of files found under the root.
    pub discovered: usize,
    /// Keys that were uploaded, whether or not the local copy could be removed.
    pub uploaded: Vec<String>,
    pub failures: Vec<TransferFailure>,
    /// Set when cancellation stopped the pass before every file was handled.
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn ObjectStore>,
}

impl TransferService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload every file below `root` into `container`, deleting each local
    /// file after its upload succeeds.
    ///
    /// Returns an error only when the folder cannot be prepared or walked; in
    /// that case nothing has been uploaded.
    pub async fn scan_and_upload(
        &self,
        root: &Path,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferError> {
        info!(root = %root.display(), "Starting folder scan");

        if !root.is_dir() {
            fs::create_dir_all(root)
                .await
                .map_err(|source| TransferError::Prepare {
                    path: root.to_path_buf(),
                    source,
                })?;
            warn!(root = %root.display(), "Scan folder did not exist, created it");
        }

        let files = collect_files(root)?;
        let mut report = TransferReport {
            discovered: files.len(),
            ..Default::default()
        };
        info!(count = files.len(), "Found files to upload");

        for path in files {
            if cancel.is_cancelled() {
                warn!("Cancellation requested, leaving remaining files for the next run");
                report.cancelled = true;
                break;
            }

            let Some(entry) = LocalFileEntry::new(root, &path) else {
                error!(path = %path.display(), "Cannot derive an object key for file");
                report.failures.push(TransferFailure {
                    relative_path: path.display().to_string(),
                    reason: FailureReason::Read,
                    message: "path is not valid UTF-8 below the scan root".into(),
                });
                continue;
            };

            match self.transfer_one(&entry, container, cancel).await {
                Ok(()) => report.uploaded.push(entry.relative_path),
                Err(failure) => {
                    if failure.reason == FailureReason::Delete {
                        report.uploaded.push(entry.relative_path);
                    }
                    report.failures.push(failure);
                }
            }
        }

        info!(
            uploaded = report.uploaded.len(),
            failed = report.failures.len(),
            "Folder scan and upload completed"
        );
        Ok(report)
    }

    async fn transfer_one(
        &self,
        entry: &LocalFileEntry,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<(), TransferFailure> {
        let key = entry.relative_path.as_str();
        let failure = |reason, message: String| TransferFailure {
            relative_path: key.to_string(),
            reason,
            message,
        };

        let file = File::open(&entry.path).await.map_err(|err| {
            error!(key, error = %err, "Cannot read local file");
            failure(FailureReason::Read, err.to_string())
        })?;
        let body: ByteStream = ReaderStream::new(file).boxed();

        info!(key, container, "Uploading file");
        self.store
            .upload(container, key, body, cancel)
            .await
            .map_err(|err| {
                error!(key, container, error = %err, "Upload failed, keeping local file");
                failure(FailureReason::Upload, err.to_string())
            })?;
        info!(key, container, "Successfully uploaded file");

        fs::remove_file(&entry.path).await.map_err(|err| {
            error!(key, error = %err, "Failed to delete local file after upload");
            failure(FailureReason::Delete, err.to_string())
        })?;
        info!(key, "Deleted local file");
        Ok(())
    }
}

/// Walk `root` and return every regular file below it, sorted by path.
///
/// Any walk error fails the whole enumeration.
fn collect_files(root: &Path) -> Result<Vec<std::path::PathBuf>, TransferError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|source| TransferError::Enumerate {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        } else if entry.path_is_symlink() {
            warn!(path = %entry.path().display(), "Skipping symbolic link");
        }
    }
    Ok(files)
}
