//! Liveness monitor background task.
//!
//! Periodically evicts cached items that have waited longer than the liveness
//! timeout without the remote side reporting them resolved. Evicted items are
//! deferred remotely (so the remote system re-offers them later) and announced
//! in a single escalation notice per tick.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::models::{EngineConfig, WorkItem};
use crate::domain::ports::ConnectionStatus;
use crate::services::delivery_sink::FeedOperation;
use crate::services::reconciler::Reconciler;

/// Shortest period the check loop will run at.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the liveness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Interval between checks.
    pub check_interval: Duration,
    /// Maximum residency before an item is evicted.
    pub timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&EngineConfig> for LivenessConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            check_interval: config.liveness_check_interval(),
            timeout: config.liveness_timeout(),
        }
    }
}

/// Status of the liveness monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Whether the background loop is running.
    pub running: bool,
    /// Checks that scanned the cache.
    pub checks: u64,
    /// Ticks skipped because the transport was disconnected.
    pub skipped_disconnected: u64,
    pub items_evicted: u64,
    pub escalations: u64,
    pub defer_failures: u64,
}

/// Outcome of one monitor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    SkippedDisconnected,
    Clean,
    Evicted {
        items: Vec<WorkItem>,
        /// Whether the defer call succeeded. Eviction stands either way.
        deferred: bool,
    },
}

/// Evicts and escalates items stuck in the reconciliation cache.
pub struct LivenessMonitor {
    reconciler: Arc<Reconciler>,
    connection: Arc<dyn ConnectionStatus>,
    config: LivenessConfig,
    status: Arc<RwLock<MonitorStatus>>,
}

impl LivenessMonitor {
    pub fn new(
        reconciler: Arc<Reconciler>,
        connection: Arc<dyn ConnectionStatus>,
        config: LivenessConfig,
    ) -> Self {
        Self {
            reconciler,
            connection,
            config,
            status: Arc::new(RwLock::new(MonitorStatus::default())),
        }
    }

    /// Spawn the periodic check loop.
    ///
    /// The first check runs one full interval after start. An interval below
    /// [`MIN_CHECK_INTERVAL`] is clamped to it. The loop stops on the shutdown
    /// signal; a check already in progress finishes first.
    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.config.check_interval < MIN_CHECK_INTERVAL {
                tracing::warn!(
                    requested_ms = self.config.check_interval.as_millis() as u64,
                    "Liveness check interval below minimum, clamping"
                );
            }
            let period = self.config.check_interval.max(MIN_CHECK_INTERVAL);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            self.status.write().await.running = true;
            tracing::info!(
                tenant = %self.reconciler.tenant_id(),
                check_interval_ms = period.as_millis() as u64,
                timeout_ms = self.config.timeout.as_millis() as u64,
                "Started liveness monitor"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Received shutdown signal, stopping liveness monitor");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.check_once().await;
                    }
                }
            }

            self.status.write().await.running = false;
        })
    }

    /// Run a single check now.
    pub async fn check_once(&self) -> TickOutcome {
        if !self.connection.is_connected() {
            self.status.write().await.skipped_disconnected += 1;
            tracing::debug!("Transport disconnected, skipping liveness check");
            return TickOutcome::SkippedDisconnected;
        }

        let tenant_id = self.reconciler.tenant_id().clone();

        // Held until the defer call returns so no pass interleaves with the tick.
        let mut cache = self.reconciler.cache().lock().await;
        let stale = cache.drain_older_than(self.config.timeout, Instant::now());

        if stale.is_empty() {
            drop(cache);
            self.status.write().await.checks += 1;
            return TickOutcome::Clean;
        }

        let items: Vec<WorkItem> = stale.into_iter().map(|entry| entry.item).collect();
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        tracing::warn!(
            tenant = %tenant_id,
            ids = ?ids,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Work items exceeded liveness timeout, evicting"
        );

        let deferred = match self.reconciler.remote().defer(&tenant_id, &ids).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(tenant = %tenant_id, ids = ?ids, error = %err, "Failed to defer evicted items");
                self.reconciler
                    .sink()
                    .report_error(FeedOperation::Defer, ids.clone(), err.to_string());
                false
            }
        };
        drop(cache);

        self.reconciler.sink().escalate(items.clone());

        let mut status = self.status.write().await;
        status.checks += 1;
        status.items_evicted += items.len() as u64;
        status.escalations += 1;
        if !deferred {
            status.defer_failures += 1;
        }

        TickOutcome::Evicted { items, deferred }
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RawWorkItem;
    use crate::domain::ports::RemoteError;
    use crate::infrastructure::remote::InMemoryWorkQueueRemote;
    use crate::services::delivery_sink::{DeliverySink, DeliverySinkConfig, FeedPayload};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        reconciler: Arc<Reconciler>,
        remote: Arc<InMemoryWorkQueueRemote>,
        sink: Arc<DeliverySink>,
        connected: Arc<AtomicBool>,
        monitor: Arc<LivenessMonitor>,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let sink = Arc::new(DeliverySink::new("t", DeliverySinkConfig::default()));
        let reconciler = Arc::new(Reconciler::new("t", remote.clone(), sink.clone()));
        let connected = Arc::new(AtomicBool::new(true));
        let monitor = Arc::new(LivenessMonitor::new(
            reconciler.clone(),
            connected.clone(),
            LivenessConfig::default(),
        ));
        Fixture {
            reconciler,
            remote,
            sink,
            connected,
            monitor,
        }
    }

    #[test]
    fn test_config_default() {
        let config = LivenessConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_engine_config() {
        let engine = EngineConfig {
            liveness_check_interval_ms: 1_000,
            liveness_timeout_ms: 5_000,
            ..EngineConfig::default()
        };
        let config = LivenessConfig::from(&engine);
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_young_items_are_left_alone() {
        let f = fixture();
        f.reconciler.submit(vec![RawWorkItem::request("a", "test")]).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(f.monitor.check_once().await, TickOutcome::Clean);
        assert_eq!(f.reconciler.cached_ids().await, vec!["a"]);
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_items_are_evicted_deferred_and_escalated() {
        let f = fixture();
        let mut events = f.sink.subscribe();
        f.reconciler.submit(vec![RawWorkItem::request("a", "test")]).await;
        events.recv().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let outcome = f.monitor.check_once().await;

        let TickOutcome::Evicted { items, deferred } = outcome else {
            panic!("expected eviction, got {outcome:?}");
        };
        assert!(deferred);
        assert_eq!(items[0].id, "a");
        assert_eq!(f.remote.deferred_ids(), vec!["a"]);
        assert_eq!(f.reconciler.cache_len().await, 0);

        match events.recv().await.unwrap().payload {
            FeedPayload::Escalation { items } => assert_eq!(items.len(), 1),
            other => panic!("unexpected payload {}", other.variant_name()),
        }

        let status = f.monitor.status().await;
        assert_eq!(status.items_evicted, 1);
        assert_eq!(status.escalations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_transport_skips_check() {
        let f = fixture();
        f.reconciler.submit(vec![RawWorkItem::request("a", "test")]).await;
        f.connected.store(false, Ordering::Release);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(f.monitor.check_once().await, TickOutcome::SkippedDisconnected);
        assert_eq!(f.reconciler.cached_ids().await, vec!["a"]);
        assert_eq!(f.remote.call_count(), 0);
        assert_eq!(f.monitor.status().await.skipped_disconnected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_failure_keeps_eviction() {
        let f = fixture();
        let mut events = f.sink.subscribe();
        f.remote.fail_defer_with(RemoteError::Transport("timeout".to_string()));
        f.reconciler.submit(vec![RawWorkItem::request("a", "test")]).await;
        events.recv().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let outcome = f.monitor.check_once().await;

        assert!(matches!(outcome, TickOutcome::Evicted { deferred: false, .. }));
        assert_eq!(f.reconciler.cache_len().await, 0);

        match events.recv().await.unwrap().payload {
            FeedPayload::ErrorReported(err) => {
                assert_eq!(err.operation, FeedOperation::Defer);
                assert_eq!(err.ids, vec!["a"]);
            }
            other => panic!("unexpected payload {}", other.variant_name()),
        }
        assert!(matches!(
            events.recv().await.unwrap().payload,
            FeedPayload::Escalation { .. }
        ));
        assert_eq!(f.monitor.status().await.defer_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_loop_evicts_on_third_tick() {
        let f = fixture();
        let mut events = f.sink.subscribe();
        f.reconciler.submit(vec![RawWorkItem::request("a", "test")]).await;
        events.recv().await.unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = f.monitor.clone().start(shutdown_rx);

        // Ticks at 30s and 60s find nothing older than 60s; the 90s tick evicts.
        tokio::time::sleep(Duration::from_secs(89)).await;
        assert_eq!(f.reconciler.cached_ids().await, vec!["a"]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.reconciler.cache_len().await, 0);
        assert_eq!(f.remote.deferred_ids(), vec!["a"]);
        assert!(matches!(
            events.recv().await.unwrap().payload,
            FeedPayload::Escalation { .. }
        ));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let status = f.monitor.status().await;
        assert!(!status.running);
        assert_eq!(status.checks, 3);
        assert_eq!(status.escalations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped_not_fatal() {
        let f = fixture();
        let monitor = Arc::new(LivenessMonitor::new(
            f.reconciler.clone(),
            f.connected.clone(),
            LivenessConfig {
                check_interval: Duration::ZERO,
                timeout: Duration::from_secs(60),
            },
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = monitor.clone().start(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = monitor.status().await;
        assert!(status.running);
        assert!(status.checks > 0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
