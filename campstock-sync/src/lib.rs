//! Offline-first storage and synchronization for CampStock inventory records
//!
//! Provides:
//! - Local SQLite store with an indexed view of records awaiting upload
//! - Sync coordinator running at most one upload pass at a time
//! - Timer and connectivity-regained triggers
//! - CSV export and list filtering

pub mod coordinator;
pub mod error;
pub mod export;
pub mod local_db;
pub mod network;
pub mod query;
pub mod record;
pub mod scheduler;
pub mod serde_duration;
pub mod uploader;

pub use coordinator::{
    PassOutcome, PassSummary, RecordFailure, RecordOutcome, SkipReason, SyncConfig,
    SyncCoordinator, SyncState, SyncTrigger,
};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use local_db::{LocalStore, StoreConfig, SyncStats};
pub use network::{ConnectivityMonitor, ConnectivityProbe, ConnectivityStatus, ProbeConfig};
pub use query::RecordQuery;
pub use record::{InventoryRecord, InventoryType, LineItem, NewInventoryRecord, RecordId};
pub use scheduler::{PassRequester, SchedulerHandle, SyncScheduler};
pub use uploader::{
    DryRunUploader, HttpUploader, HttpUploaderConfig, RemoteUploader, UnconfiguredUploader,
    UploadEnvelope, UploadError,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::network::ProbeHandle;

/// Connectivity probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// `host:port` to probe; derived from `sync.endpoint` when unset
    pub probe_target: Option<String>,
    #[serde(rename = "probe_interval_secs", with = "serde_duration::secs")]
    pub probe_interval: Duration,
    #[serde(rename = "probe_timeout_ms", with = "serde_duration::millis")]
    pub probe_timeout: Duration,
    /// Skip probing and always report online
    pub assume_online: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_target: None,
            probe_interval: Duration::from_secs(15),
            probe_timeout: Duration::from_millis(3000),
            assume_online: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
}

impl EngineConfig {
    /// Reject settings the background tasks cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first zero interval or timeout.
    pub fn validate(&self) -> SyncResult<()> {
        let durations = [
            ("sync.interval_secs", self.sync.interval),
            ("sync.upload_timeout_secs", self.sync.upload_timeout),
            ("connectivity.probe_interval_secs", self.connectivity.probe_interval),
            ("connectivity.probe_timeout_ms", self.connectivity.probe_timeout),
        ];

        match durations.iter().find(|(_, value)| value.is_zero()) {
            Some((name, _)) => Err(SyncError::Config(format!(
                "{} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// Build the uploader selected by `config`.
///
/// Dry-run wins over an endpoint. Without either, uploads fail and records
/// stay pending.
pub fn build_uploader(config: &SyncConfig) -> SyncResult<Arc<dyn RemoteUploader>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunUploader::new(config.dry_run_latency)));
    }

    match &config.endpoint {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            let uploader = HttpUploader::new(HttpUploaderConfig {
                endpoint: endpoint.clone(),
                request_timeout: config.upload_timeout,
            })
            .map_err(|e| SyncError::Config(e.to_string()))?;
            Ok(Arc::new(uploader))
        }
        _ => {
            tracing::warn!("No sync endpoint configured, uploads will fail");
            Ok(Arc::new(UnconfiguredUploader))
        }
    }
}

/// Sync engine for offline-first operations
///
/// Owns the one store, connectivity monitor and coordinator of a process.
pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<LocalStore>,
    connectivity: ConnectivityMonitor,
    coordinator: Arc<SyncCoordinator>,
}

impl SyncEngine {
    pub async fn open(config: EngineConfig) -> SyncResult<Self> {
        config.validate()?;
        let uploader = build_uploader(&config.sync)?;
        Self::with_uploader(config, uploader).await
    }

    pub async fn with_uploader(
        config: EngineConfig,
        uploader: Arc<dyn RemoteUploader>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let store = Arc::new(LocalStore::open(&config.store).await?);
        let connectivity = ConnectivityMonitor::default();
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            uploader,
            connectivity.clone(),
            config.sync.upload_timeout,
        ));

        Ok(Self {
            config,
            store,
            connectivity,
            coordinator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Get node ID
    pub fn node_id(&self) -> uuid::Uuid {
        self.store.node_id()
    }

    /// Whether a real remote is configured (an endpoint or dry-run mode)
    pub fn has_remote(&self) -> bool {
        self.config.sync.dry_run
            || self
                .config
                .sync
                .endpoint
                .as_deref()
                .is_some_and(|e| !e.trim().is_empty())
    }

    fn probe_config(&self) -> Option<ProbeConfig> {
        let settings = &self.config.connectivity;
        if settings.assume_online {
            return None;
        }

        let target = settings.probe_target.clone().or_else(|| {
            self.config
                .sync
                .endpoint
                .as_deref()
                .and_then(network::probe_target_for)
        })?;

        Some(ProbeConfig {
            target,
            interval: settings.probe_interval,
            timeout: settings.probe_timeout,
        })
    }

    /// Probe once and publish the result. Without a probe target the device
    /// counts as online.
    pub async fn check_connectivity(&self) -> ConnectivityStatus {
        match self.probe_config() {
            Some(config) => {
                ConnectivityProbe::new(config, self.connectivity.clone())
                    .check()
                    .await
            }
            None => {
                self.connectivity.set_status(ConnectivityStatus::Online);
                ConnectivityStatus::Online
            }
        }
    }

    /// Start the scheduler and, when there is something to probe, the
    /// connectivity probe.
    pub fn start_background(&self) -> BackgroundHandle {
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&self.coordinator),
            &self.connectivity,
            self.config.sync.interval,
        );
        let probe = self
            .probe_config()
            .map(|config| ConnectivityProbe::new(config, self.connectivity.clone()).spawn());

        BackgroundHandle { scheduler, probe }
    }

    pub async fn close(self) {
        self.store.close().await;
        tracing::info!("Sync engine closed");
    }
}

/// Background tasks started by [`SyncEngine::start_background`]
pub struct BackgroundHandle {
    scheduler: SchedulerHandle,
    probe: Option<ProbeHandle>,
}

impl BackgroundHandle {
    pub async fn shutdown(self) {
        if let Some(probe) = self.probe {
            probe.stop().await;
        }
        self.scheduler.shutdown().await;
    }
}
