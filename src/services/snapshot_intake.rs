//! Debounced snapshot intake.
//!
//! The transport may emit several notifications for what is semantically one
//! change. Intake waits for a quiet window after the last notification of a
//! burst and forwards only the most recent snapshot to the reconciler. The
//! window restarts on every arrival.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::domain::models::Snapshot;
use crate::services::reconciler::Reconciler;

/// Counters reported when the intake loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeReport {
    /// Snapshot notifications received from the transport.
    pub received: u64,
    /// Notifications discarded because a newer one arrived within the window.
    pub coalesced: u64,
    /// Snapshots handed to the reconciler.
    pub dispatched: u64,
}

enum Burst {
    Settled(Snapshot),
    Closed(Snapshot),
    Shutdown,
}

/// Coalesces bursts of snapshot notifications into single reconciler submissions.
pub struct SnapshotIntake {
    reconciler: Arc<Reconciler>,
    debounce_window: Duration,
}

impl SnapshotIntake {
    pub fn new(reconciler: Arc<Reconciler>, debounce_window: Duration) -> Self {
        Self {
            reconciler,
            debounce_window,
        }
    }

    /// Spawn the intake loop.
    ///
    /// The loop ends when the snapshot channel closes (after forwarding any
    /// snapshot it still holds) or when a shutdown signal arrives (dropping
    /// it). Either way the task only finishes once every pass it started has
    /// completed.
    pub fn start(
        self,
        snapshots: mpsc::UnboundedReceiver<Snapshot>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<IntakeReport> {
        tokio::spawn(self.run(snapshots, shutdown_rx))
    }

    /// Run the intake loop on the current task.
    pub async fn run(
        self,
        mut snapshots: mpsc::UnboundedReceiver<Snapshot>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> IntakeReport {
        let mut report = IntakeReport::default();
        let mut drivers = JoinSet::new();
        tracing::debug!(
            tenant = %self.reconciler.tenant_id(),
            window_ms = self.debounce_window.as_millis() as u64,
            "Snapshot intake started"
        );

        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                next = snapshots.recv() => match next {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            report.received += 1;

            match self
                .settle(first, &mut snapshots, &mut shutdown_rx, &mut report)
                .await
            {
                Burst::Settled(snapshot) => self.dispatch(snapshot, &mut drivers, &mut report),
                Burst::Closed(snapshot) => {
                    self.dispatch(snapshot, &mut drivers, &mut report);
                    break;
                }
                Burst::Shutdown => break,
            }
        }

        // Passes started here finish before the intake reports itself stopped.
        while let Some(result) = drivers.join_next().await {
            if let Err(err) = result {
                tracing::error!(error = %err, "Reconciliation driver task failed");
            }
        }

        tracing::debug!(
            received = report.received,
            coalesced = report.coalesced,
            dispatched = report.dispatched,
            "Snapshot intake stopped"
        );
        report
    }

    async fn settle(
        &self,
        mut latest: Snapshot,
        snapshots: &mut mpsc::UnboundedReceiver<Snapshot>,
        shutdown_rx: &mut broadcast::Receiver<()>,
        report: &mut IntakeReport,
    ) -> Burst {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return Burst::Shutdown,
                next = snapshots.recv() => match next {
                    Some(snapshot) => {
                        report.received += 1;
                        report.coalesced += 1;
                        latest = snapshot;
                    }
                    None => return Burst::Closed(latest),
                },
                () = tokio::time::sleep(self.debounce_window) => return Burst::Settled(latest),
            }
        }
    }

    fn dispatch(
        &self,
        snapshot: Snapshot,
        drivers: &mut JoinSet<()>,
        report: &mut IntakeReport,
    ) {
        report.dispatched += 1;
        tracing::trace!(items = snapshot.len(), "Snapshot settled");

        while let Some(result) = drivers.try_join_next() {
            if let Err(err) = result {
                tracing::error!(error = %err, "Reconciliation driver task failed");
            }
        }

        // Claimed here, in settle order; only the pass itself runs on the driver task.
        let claim = self.reconciler.claim(snapshot);
        let reconciler = Arc::clone(&self.reconciler);
        drivers.spawn(async move {
            reconciler.complete(claim).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RawWorkItem;
    use crate::infrastructure::remote::InMemoryWorkQueueRemote;
    use crate::services::delivery_sink::{DeliverySink, DeliverySinkConfig, FeedPayload};

    fn reconciler() -> (Arc<Reconciler>, Arc<DeliverySink>) {
        let sink = Arc::new(DeliverySink::new("t", DeliverySinkConfig::default()));
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        (Arc::new(Reconciler::new("t", remote, sink.clone())), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced_to_latest() {
        let (reconciler, sink) = reconciler();
        let mut events = sink.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let intake = SnapshotIntake::new(reconciler.clone(), Duration::from_millis(200));
        let handle = intake.start(rx, shutdown_rx);

        for i in 0..4 {
            tx.send(vec![RawWorkItem::request(format!("s{i}"), "test")]).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let event = events.recv().await.unwrap();
        match event.payload {
            FeedPayload::ItemsDelivered { items, .. } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id(), "s3");
            }
            other => panic!("unexpected payload {}", other.variant_name()),
        }
        assert_eq!(reconciler.stats().await.passes_run, 1);

        shutdown_tx.send(()).unwrap();
        let report = handle.await.unwrap();
        assert_eq!(
            report,
            IntakeReport {
                received: 4,
                coalesced: 3,
                dispatched: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_snapshots_each_dispatch() {
        let (reconciler, _sink) = reconciler();
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = SnapshotIntake::new(reconciler.clone(), Duration::from_millis(200))
            .start(rx, shutdown_rx);

        tx.send(vec![RawWorkItem::request("a", "test")]).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(vec![RawWorkItem::request("a", "test"), RawWorkItem::request("b", "test")])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        drop(tx);
        let report = handle.await.unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.coalesced, 0);
        assert_eq!(reconciler.cached_ids().await, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_close_flushes_held_snapshot() {
        let (reconciler, _sink) = reconciler();
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = SnapshotIntake::new(reconciler.clone(), Duration::from_secs(10))
            .start(rx, shutdown_rx);

        tx.send(vec![RawWorkItem::request("a", "test")]).unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(reconciler.cached_ids().await, vec!["a"]);
        assert!(!reconciler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_waits_for_started_pass() {
        let sink = Arc::new(DeliverySink::new("t", DeliverySinkConfig::default()));
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let reconciler = Arc::new(Reconciler::new("t", remote.clone(), sink));
        remote.pause();

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = SnapshotIntake::new(reconciler.clone(), Duration::from_millis(200))
            .start(rx, shutdown_rx);

        tx.send(vec![
            RawWorkItem::request("a", "test"),
            RawWorkItem::notification("n", "unknown-topic"),
        ])
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(reconciler.is_running());

        shutdown_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        remote.resume();
        let report = handle.await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert!(!reconciler.is_running());
        assert_eq!(reconciler.cached_ids().await, vec!["a"]);
        assert_eq!(remote.processed_ids(), vec!["n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_unsettled_snapshot() {
        let (reconciler, _sink) = reconciler();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = SnapshotIntake::new(reconciler.clone(), Duration::from_secs(10))
            .start(rx, shutdown_rx);

        tx.send(vec![RawWorkItem::request("a", "test")]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.dispatched, 0);
        assert_eq!(reconciler.cache_len().await, 0);
    }
}
