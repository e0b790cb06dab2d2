//! Sync coordinator
//!
//! Pass flow:
//! 1. Refuse if offline (an error for manual requests, a skip otherwise)
//! 2. Refuse silently if a pass is already running
//! 3. Snapshot the unsynced records
//! 4. Upload each record on its own; mark it synced only after its upload
//!    succeeded
//! 5. Summarize per-record results and return to idle
//!
//! A failed record never aborts the pass. There is no retry policy beyond the
//! next trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::local_db::LocalStore;
use crate::network::ConnectivityMonitor;
use crate::record::{InventoryRecord, RecordId};
use crate::serde_duration;
use crate::uploader::{RemoteUploader, UploadEnvelope, UploadError};

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server base URL
    pub endpoint: Option<String>,
    /// Time between timer-triggered passes
    #[serde(rename = "interval_secs", with = "serde_duration::secs")]
    pub interval: Duration,
    /// Upper bound on a single record upload
    #[serde(rename = "upload_timeout_secs", with = "serde_duration::secs")]
    pub upload_timeout: Duration,
    /// Accept uploads locally instead of contacting the server
    pub dry_run: bool,
    /// Simulated upload latency in dry-run mode
    #[serde(rename = "dry_run_latency_ms", with = "serde_duration::millis")]
    pub dry_run_latency: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            interval: Duration::from_secs(5 * 60),
            upload_timeout: Duration::from_secs(30),
            dry_run: false,
            dry_run_latency: Duration::from_millis(500),
        }
    }
}

/// What asked for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Timer,
    ConnectivityRegained,
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTrigger::Timer => f.write_str("timer"),
            SyncTrigger::ConnectivityRegained => f.write_str("connectivity"),
            SyncTrigger::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    Offline,
}

/// Why one record was left unsynced
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordFailure {
    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("uploaded but could not be marked synced: {0}")]
    MarkSynced(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub id: RecordId,
    pub result: Result<(), RecordFailure>,
}

/// Result of one completed pass
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<RecordOutcome>,
}

impl PassSummary {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn synced_ids(&self) -> Vec<RecordId> {
        self.results
            .iter()
            .filter(|r| r.result.is_ok())
            .map(|r| r.id)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (RecordId, &RecordFailure)> + '_ {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.id, e)))
    }

    /// Failures as crate errors, for reporting
    pub fn upload_errors(&self) -> Vec<SyncError> {
        self.failures()
            .map(|(id, failure)| SyncError::Upload {
                id,
                reason: failure.to_string(),
            })
            .collect()
    }

    pub fn synced_count(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.attempted() - self.synced_count()
    }
}

#[derive(Debug, Clone)]
pub enum PassOutcome {
    Completed(PassSummary),
    Skipped(SkipReason),
}

impl PassOutcome {
    pub fn summary(&self) -> Option<&PassSummary> {
        match self {
            PassOutcome::Completed(summary) => Some(summary),
            PassOutcome::Skipped(_) => None,
        }
    }
}

/// Holds the running flag for the lifetime of a pass
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Uploads unsynced records, one pass at a time
pub struct SyncCoordinator {
    store: Arc<LocalStore>,
    uploader: Arc<dyn RemoteUploader>,
    connectivity: ConnectivityMonitor,
    upload_timeout: Duration,
    running: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<LocalStore>,
        uploader: Arc<dyn RemoteUploader>,
        connectivity: ConnectivityMonitor,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            uploader,
            connectivity,
            upload_timeout,
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SyncState {
        if self.running.load(Ordering::Acquire) {
            SyncState::Running
        } else {
            SyncState::Idle
        }
    }

    /// Manual "sync now"
    pub async fn sync_now(&self) -> SyncResult<PassOutcome> {
        self.request_pass(SyncTrigger::Manual).await
    }

    /// Run a pass unless one is already running or the device is offline.
    ///
    /// Only a manual request made while offline, or a failure to read the
    /// unsynced snapshot, is reported as an error. Individual upload failures
    /// are part of the returned summary.
    pub async fn request_pass(&self, trigger: SyncTrigger) -> SyncResult<PassOutcome> {
        if !self.connectivity.is_online() {
            if trigger == SyncTrigger::Manual {
                return Err(SyncError::Offline);
            }
            tracing::debug!(trigger = %trigger, "Offline, skipping sync pass");
            return Ok(PassOutcome::Skipped(SkipReason::Offline));
        }

        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            tracing::debug!(trigger = %trigger, "Sync pass already in progress, skipping");
            return Ok(PassOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let summary = self.run_pass(trigger).await?;
        Ok(PassOutcome::Completed(summary))
    }

    async fn run_pass(&self, trigger: SyncTrigger) -> SyncResult<PassSummary> {
        let started_at = Utc::now();
        let snapshot = self.store.get_unsynced().await?;
        let node_id = self.store.node_id();

        tracing::info!(trigger = %trigger, pending = snapshot.len(), "Sync pass started");

        let mut results = Vec::with_capacity(snapshot.len());
        for record in snapshot {
            let id = record.id;
            let result = self.sync_record(node_id, record).await;
            if let Err(failure) = &result {
                tracing::warn!(record_id = %id, error = %failure, "Failed to sync record");
            }
            results.push(RecordOutcome { id, result });
        }

        let summary = PassSummary {
            trigger,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        tracing::info!(
            trigger = %trigger,
            attempted = summary.attempted(),
            synced = summary.synced_count(),
            failed = summary.failed_count(),
            "Sync pass finished"
        );

        Ok(summary)
    }

    async fn sync_record(&self, node_id: Uuid, record: InventoryRecord) -> Result<(), RecordFailure> {
        let id = record.id;
        let envelope = UploadEnvelope::new(node_id, record);

        match tokio::time::timeout(self.upload_timeout, self.uploader.upload(&envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(UploadError::TimedOut(self.upload_timeout).into()),
        }

        self.store
            .mark_synced(id)
            .await
            .map_err(|e| RecordFailure::MarkSynced(e.to_string()))
    }
}
