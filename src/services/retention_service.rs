//! Caps the number of objects kept per logical folder of a container.
//!
//! Objects are grouped by the directory part of their key. Any folder holding
//! more than the configured limit loses its oldest objects, ordered by
//! creation time; objects without a creation time go first.

use crate::{
    errors::StorageError,
    models::remote_object::RemoteObjectRecord,
    services::object_store::ObjectStore,
};
use futures::TryStreamExt;
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one prune pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// True when no limit is configured and the store was not consulted.
    pub skipped: bool,
    pub listed: usize,
    pub folders: usize,
    pub deleted: Vec<String>,
    /// Keys whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct RetentionService {
    store: Arc<dyn ObjectStore>,
}

impl RetentionService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Delete every object of `container` that is not among the newest
    /// `max_per_folder` of its folder. `None` disables pruning.
    ///
    /// A listing failure aborts before anything is deleted.
    pub async fn prune(
        &self,
        container: &str,
        max_per_folder: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<PruneReport, StorageError> {
        let Some(max_per_folder) = max_per_folder else {
            debug!("No retention limit configured, skipping prune");
            return Ok(PruneReport {
                skipped: true,
                ..Default::default()
            });
        };
        if max_per_folder == 0 {
            warn!(container, "Retention limit is 0, every object will be deleted");
        }

        info!(container, max_per_folder, "Starting retention prune");
        let records = self.list_records(container, cancel).await?;
        let folders = group_by_folder(records.iter().cloned());
        let mut report = PruneReport {
            listed: records.len(),
            folders: folders.len(),
            ..Default::default()
        };

        let marked = select_for_deletion(folders, max_per_folder);
        if marked.is_empty() {
            info!(container, listed = report.listed, "Nothing to prune");
            return Ok(report);
        }

        let keys: Vec<String> = marked.iter().map(RemoteObjectRecord::key).collect();
        info!(container, count = keys.len(), "Deleting objects beyond retention limit");

        for (key, outcome) in self.store.delete_batch(container, &keys, cancel).await {
            match outcome {
                Ok(existed) => {
                    debug!(key = %key, existed, "Deleted outdated object");
                    report.deleted.push(key);
                }
                Err(err) => {
                    error!(key = %key, container, error = %err, "Failed to delete outdated object");
                    report.failed.push((key, err.to_string()));
                }
            }
        }

        info!(
            container,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Retention prune completed"
        );
        Ok(report)
    }

    async fn list_records(
        &self,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteObjectRecord>, StorageError> {
        let listing = self
            .store
            .list(container)
            .map_ok(RemoteObjectRecord::from_entry)
            .try_collect::<Vec<_>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            records = listing => records,
        }
    }
}

fn group_by_folder(
    records: impl IntoIterator<Item = RemoteObjectRecord>,
) -> BTreeMap<String, Vec<RemoteObjectRecord>> {
    let mut folders: BTreeMap<String, Vec<RemoteObjectRecord>> = BTreeMap::new();
    for record in records {
        folders.entry(record.folder.clone()).or_default().push(record);
    }
    folders
}

/// Pick the objects to delete: everything past the newest `max_per_folder`
/// in each folder holding strictly more than `max_per_folder` objects.
pub fn select_for_deletion(
    folders: BTreeMap<String, Vec<RemoteObjectRecord>>,
    max_per_folder: usize,
) -> Vec<RemoteObjectRecord> {
    let mut marked = Vec::new();
    for (folder, mut records) in folders {
        if records.len() <= max_per_folder {
            continue;
        }
        records.sort_by(RemoteObjectRecord::newest_first);
        let excess = records.split_off(max_per_folder);
        debug!(folder = %folder, kept = records.len(), pruned = excess.len(), "Folder over limit");
        marked.extend(excess);
    }
    marked
}
