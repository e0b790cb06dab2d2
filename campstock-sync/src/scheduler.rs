//! Background triggers for sync passes
//!
//! The scheduler asks for a pass on a fixed interval and whenever the
//! connectivity monitor goes from offline to online. Each pass runs on its own
//! task so the loop keeps observing ticks; overlapping requests are turned
//! into no-ops by the coordinator.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::coordinator::{PassOutcome, SyncCoordinator, SyncTrigger};
use crate::error::SyncResult;
use crate::network::ConnectivityMonitor;

/// Something the scheduler can ask for a pass
#[async_trait]
pub trait PassRequester: Send + Sync + 'static {
    async fn request_pass(&self, trigger: SyncTrigger) -> SyncResult<PassOutcome>;
}

#[async_trait]
impl PassRequester for SyncCoordinator {
    async fn request_pass(&self, trigger: SyncTrigger) -> SyncResult<PassOutcome> {
        SyncCoordinator::request_pass(self, trigger).await
    }
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Start the trigger loop. The first timer trigger fires one full
    /// `interval` after this call.
    pub fn spawn<R: PassRequester>(
        target: Arc<R>,
        connectivity: &ConnectivityMonitor,
        interval: Duration,
    ) -> SchedulerHandle {
        let monitor = connectivity.clone();
        let mut status_rx = monitor.subscribe();
        let mut last_status = *status_rx.borrow_and_update();
        let mut seen_regained = monitor.regained_count();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut watching = true;
            let mut passes = JoinSet::new();

            tracing::info!(interval_secs = interval.as_secs(), "Sync scheduler started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if last_status.is_online() {
                            launch(&mut passes, &target, SyncTrigger::Timer);
                        } else {
                            tracing::debug!("Offline at timer tick, no pass requested");
                        }
                    }
                    changed = status_rx.changed(), if watching => {
                        if changed.is_err() {
                            watching = false;
                            continue;
                        }
                        last_status = *status_rx.borrow_and_update();
                        let regained = monitor.regained_count();
                        if regained > seen_regained {
                            launch(&mut passes, &target, SyncTrigger::ConnectivityRegained);
                        }
                        seen_regained = regained;
                    }
                    Some(joined) = passes.join_next(), if !passes.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Sync pass task panicked");
                        }
                    }
                }
            }

            while let Some(joined) = passes.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Sync pass task panicked");
                }
            }

            tracing::info!("Sync scheduler stopped");
        });

        SchedulerHandle { stop_tx, task }
    }
}

fn launch<R: PassRequester>(passes: &mut JoinSet<()>, target: &Arc<R>, trigger: SyncTrigger) {
    let target = Arc::clone(target);
    passes.spawn(async move {
        match target.request_pass(trigger).await {
            Ok(PassOutcome::Completed(summary)) if summary.synced_count() > 0 => {
                tracing::info!(
                    trigger = %trigger,
                    synced = summary.synced_count(),
                    "Background sync uploaded records"
                );
            }
            Ok(outcome) => {
                tracing::debug!(trigger = %trigger, ?outcome, "Background sync finished");
            }
            Err(e) => {
                tracing::warn!(trigger = %trigger, error = %e, "Background sync failed");
            }
        }
    });
}

/// Stops the scheduler. Dropping the handle also stops it, without waiting.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop triggering and wait for passes already in flight.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Sync scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SkipReason;
    use crate::network::ConnectivityStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct RecordingRequester {
        triggers: mpsc::UnboundedSender<SyncTrigger>,
        pass_duration: Duration,
        finished: AtomicUsize,
    }

    impl RecordingRequester {
        fn new(pass_duration: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<SyncTrigger>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let requester = Arc::new(Self {
                triggers: tx,
                pass_duration,
                finished: AtomicUsize::new(0),
            });
            (requester, rx)
        }
    }

    #[async_trait]
    impl PassRequester for RecordingRequester {
        async fn request_pass(&self, trigger: SyncTrigger) -> SyncResult<PassOutcome> {
            let _ = self.triggers.send(trigger);
            tokio::time::sleep(self.pass_duration).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(PassOutcome::Skipped(SkipReason::AlreadyRunning))
        }
    }

    const INTERVAL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_full_interval() {
        let (requester, mut rx) = RecordingRequester::new(Duration::ZERO);
        let monitor = ConnectivityMonitor::default();
        let start = Instant::now();

        let handle = SyncScheduler::spawn(requester, &monitor, INTERVAL);

        assert_eq!(rx.recv().await, Some(SyncTrigger::Timer));
        assert!(start.elapsed() >= INTERVAL);

        assert_eq!(rx.recv().await, Some(SyncTrigger::Timer));
        assert!(start.elapsed() >= INTERVAL * 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_regained_triggers_pass() {
        let (requester, mut rx) = RecordingRequester::new(Duration::ZERO);
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Offline);
        let start = Instant::now();

        let handle = SyncScheduler::spawn(requester, &monitor, INTERVAL);
        tokio::time::sleep(Duration::from_secs(10)).await;

        monitor.set_online(true);

        assert_eq!(rx.recv().await, Some(SyncTrigger::ConnectivityRegained));
        assert!(start.elapsed() < INTERVAL);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_going_offline_does_not_trigger() {
        let (requester, mut rx) = RecordingRequester::new(Duration::ZERO);
        let monitor = ConnectivityMonitor::default();

        let handle = SyncScheduler::spawn(requester, &monitor, INTERVAL);
        tokio::time::sleep(Duration::from_secs(1)).await;

        monitor.set_online(false);
        monitor.set_online(false);
        tokio::time::sleep(INTERVAL * 2).await;
        assert!(rx.try_recv().is_err());

        monitor.set_online(true);
        assert_eq!(rx.recv().await, Some(SyncTrigger::ConnectivityRegained));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_outage_between_polls_still_triggers() {
        let (requester, mut rx) = RecordingRequester::new(Duration::ZERO);
        let monitor = ConnectivityMonitor::default();

        let handle = SyncScheduler::spawn(requester, &monitor, INTERVAL);
        tokio::time::sleep(Duration::from_secs(1)).await;

        monitor.set_online(false);
        monitor.set_online(true);

        assert_eq!(rx.recv().await, Some(SyncTrigger::ConnectivityRegained));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_pass() {
        let (requester, mut rx) = RecordingRequester::new(Duration::from_secs(20));
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Offline);

        let handle = SyncScheduler::spawn(requester.clone(), &monitor, INTERVAL);
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.set_online(true);
        assert_eq!(rx.recv().await, Some(SyncTrigger::ConnectivityRegained));

        handle.shutdown().await;
        assert_eq!(requester.finished.load(Ordering::SeqCst), 1);

        tokio::time::sleep(INTERVAL * 3).await;
        assert!(rx.try_recv().is_err());
    }
}
