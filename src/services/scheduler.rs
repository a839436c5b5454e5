//! Periodic scan loop.
//!
//! ```text
//! Idle ──→ Running(cycle) ──→ Sleeping ──→ Idle ...
//!   └──────────┴─────────────────┴──→ Stopping ──→ Stopped   (on cancellation)
//! ```
//!
//! A cycle is one transfer pass followed by one retention pass. Cycles run
//! behind a single-permit gate, so two of them never overlap; a caller that
//! finds the gate taken waits for it instead of skipping its turn.

use crate::{
    config::AppConfig,
    errors::{StorageError, TransferError},
    services::{
        object_store::ObjectStore,
        retention_service::{PruneReport, RetentionService},
        transfer_service::{TransferReport, TransferService},
    },
};
use futures::FutureExt;
use std::{any::Any, panic::AssertUnwindSafe, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopping,
    Stopped,
}

/// What a cycle needs from the configuration.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub scan_folder: PathBuf,
    pub container: String,
    pub max_files_to_store: Option<usize>,
    pub interval: Duration,
}

impl From<&AppConfig> for ScanSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            scan_folder: cfg.scan_folder.clone(),
            container: cfg.container.clone(),
            max_files_to_store: cfg.max_files_to_store,
            interval: cfg.scan_interval(),
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub transfer: Result<TransferReport, TransferError>,
    pub prune: Result<PruneReport, StorageError>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The cycle panicked; the message is the panic payload when it was a string.
    Faulted(String),
    /// Cancellation fired before the gate could be acquired.
    Cancelled,
}

pub struct ScanScheduler {
    transfer: TransferService,
    retention: RetentionService,
    settings: ScanSettings,
    gate: Semaphore,
    state: watch::Sender<SchedulerState>,
}

impl ScanScheduler {
    pub fn new(store: Arc<dyn ObjectStore>, settings: ScanSettings) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            transfer: TransferService::new(store.clone()),
            retention: RetentionService::new(store),
            settings,
            gate: Semaphore::new(1),
            state,
        }
    }

    /// Observe state transitions.
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Run cycles every `interval` until `cancel` fires.
    ///
    /// Errors inside a cycle are logged and never end the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            container = %self.settings.container,
            "Scan scheduler is starting"
        );

        while !cancel.is_cancelled() {
            if let CycleOutcome::Cancelled = self.run_cycle(&cancel).await {
                break;
            }

            self.set_state(SchedulerState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
            self.set_state(SchedulerState::Idle);
        }

        self.set_state(SchedulerState::Stopping);
        info!("Scan scheduler is stopping");
        self.set_state(SchedulerState::Stopped);
    }

    /// Run one gated cycle: transfer, then retention regardless of how the
    /// transfer went.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Cancelled,
            permit = self.gate.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return CycleOutcome::Cancelled,
            },
        };

        self.set_state(SchedulerState::Running);
        info!("=========================== SCAN STARTED ===========================");

        let outcome = match AssertUnwindSafe(self.cycle(cancel)).catch_unwind().await {
            Ok(report) => {
                log_summary(&report);
                CycleOutcome::Completed(report)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "Scan cycle faulted");
                CycleOutcome::Faulted(message)
            }
        };

        info!("=========================== SCAN FINISHED ==========================");
        self.set_state(SchedulerState::Idle);
        outcome
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let settings = &self.settings;

        let transfer = self
            .transfer
            .scan_and_upload(&settings.scan_folder, &settings.container, cancel)
            .await;
        if let Err(err) = &transfer {
            error!(error = %err, "Folder scan failed");
        }

        let prune = self
            .retention
            .prune(&settings.container, settings.max_files_to_store, cancel)
            .await;
        match &prune {
            Err(StorageError::Cancelled) => info!("Retention prune cancelled by shutdown"),
            Err(err) => error!(error = %err, "Retention prune failed"),
            Ok(_) => {}
        }

        CycleReport { transfer, prune }
    }

    fn set_state(&self, next: SchedulerState) {
        let previous = self.state.send_replace(next);
        debug!(?previous, ?next, "Scheduler state changed");
    }
}

fn log_summary(report: &CycleReport) {
    if let Ok(transfer) = &report.transfer {
        info!(
            discovered = transfer.discovered,
            uploaded = transfer.uploaded.len(),
            failed = transfer.failures.len(),
            cancelled = transfer.cancelled,
            "Transfer summary"
        );
        for failure in &transfer.failures {
            warn!(
                key = %failure.relative_path,
                reason = ?failure.reason,
                message = %failure.message,
                "File not fully transferred"
            );
        }
    }
    if let Ok(prune) = &report.prune {
        if !prune.skipped {
            info!(
                listed = prune.listed,
                folders = prune.folders,
                deleted = prune.deleted.len(),
                failed = prune.failed.len(),
                "Retention summary"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
