//! Connectivity tracking
//!
//! [`ConnectivityMonitor`] is the online/offline signal the rest of the crate
//! observes. [`ConnectivityProbe`] feeds it by periodically opening a TCP
//! connection to a known host; tests drive the monitor directly instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityStatus::Online
        } else {
            ConnectivityStatus::Offline
        }
    }

    pub fn is_online(self) -> bool {
        matches!(self, ConnectivityStatus::Online)
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityStatus::Online => f.write_str("Connected"),
            ConnectivityStatus::Offline => f.write_str("Offline"),
        }
    }
}

/// Shared, subscribable online/offline flag
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityStatus>>,
    regained: Arc<AtomicU64>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            regained: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Publish a new status. Subscribers are only woken when it changes.
    pub fn set_status(&self, status: ConnectivityStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            // Counted before subscribers are woken.
            if status.is_online() {
                self.regained.fetch_add(1, Ordering::SeqCst);
            }
            *current = status;
            true
        });

        if changed {
            match status {
                ConnectivityStatus::Online => tracing::info!("Network: online"),
                ConnectivityStatus::Offline => tracing::warn!("Network: offline"),
            }
        }
    }

    pub fn set_online(&self, online: bool) {
        self.set_status(ConnectivityStatus::from_online(online));
    }

    /// Number of offline to online transitions so far. Watch receivers only
    /// see the latest status, so a quick offline/online flap between two
    /// polls shows up here but not as a status change.
    pub fn regained_count(&self) -> u64 {
        self.regained.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityStatus::Online)
    }
}

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// `host:port` to connect to
    pub target: String,
    /// Time between checks
    pub interval: Duration,
    /// Connect timeout for a single check
    pub timeout: Duration,
}

/// Periodic reachability check that publishes into a monitor
pub struct ConnectivityProbe {
    config: ProbeConfig,
    monitor: ConnectivityMonitor,
}

impl ConnectivityProbe {
    pub fn new(config: ProbeConfig, monitor: ConnectivityMonitor) -> Self {
        Self { config, monitor }
    }

    /// Run one check and publish the result.
    pub async fn check(&self) -> ConnectivityStatus {
        let status = ConnectivityStatus::from_online(
            is_reachable(&self.config.target, self.config.timeout).await,
        );
        self.monitor.set_status(status);
        status
    }

    /// Check on an interval until the handle is stopped.
    pub fn spawn(self) -> ProbeHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check().await;
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            tracing::debug!(probe_target = %self.config.target, "Connectivity probe stopped");
        });

        ProbeHandle { stop_tx, task }
    }
}

pub struct ProbeHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Connectivity probe task ended abnormally");
        }
    }
}

/// Whether a TCP connection to `target` can be opened within `timeout`
pub async fn is_reachable(target: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(probe_target = %target, error = %e, "Connectivity check failed");
            false
        }
        Err(_) => {
            tracing::debug!(probe_target = %target, "Connectivity check timed out");
            false
        }
    }
}

/// Derive a `host:port` probe target from an HTTP(S) endpoint URL
pub fn probe_target_for(endpoint: &str) -> Option<String> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Offline);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectivityStatus::Online);
        assert!(monitor.is_online());
    }

    #[test]
    fn test_regained_count_tracks_each_reconnect() {
        let monitor = ConnectivityMonitor::default();
        let rx = monitor.subscribe();

        monitor.set_online(true);
        monitor.set_online(false);
        monitor.set_online(true);
        monitor.set_online(false);
        monitor.set_online(true);

        assert_eq!(monitor.regained_count(), 2);
        assert_eq!(*rx.borrow(), ConnectivityStatus::Online);
    }

    #[tokio::test]
    async fn test_probe_reports_reachable_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Offline);

        let probe = ConnectivityProbe::new(
            ProbeConfig {
                target,
                interval: Duration::from_secs(60),
                timeout: Duration::from_secs(2),
            },
            monitor.clone(),
        );

        assert_eq!(probe.check().await, ConnectivityStatus::Online);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_probe_reports_unreachable_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);

        let monitor = ConnectivityMonitor::default();
        let probe = ConnectivityProbe::new(
            ProbeConfig {
                target,
                interval: Duration::from_secs(60),
                timeout: Duration::from_secs(2),
            },
            monitor.clone(),
        );

        assert_eq!(probe.check().await, ConnectivityStatus::Offline);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_spawned_probe_stops() {
        let monitor = ConnectivityMonitor::default();
        let handle = ConnectivityProbe::new(
            ProbeConfig {
                target: "127.0.0.1:9".to_string(),
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            },
            monitor,
        )
        .spawn();

        handle.stop().await;
    }

    #[test]
    fn test_probe_target_for_endpoint() {
        assert_eq!(
            probe_target_for("https://sync.example.org/api").as_deref(),
            Some("sync.example.org:443")
        );
        assert_eq!(
            probe_target_for("http://10.0.0.5:8080").as_deref(),
            Some("10.0.0.5:8080")
        );
        assert_eq!(probe_target_for("not a url"), None);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ConnectivityStatus::Online.to_string(), "Connected");
        assert_eq!(ConnectivityStatus::Offline.to_string(), "Offline");
    }
}
