//! Task feed: the entry point application code embeds.
//!
//! Wires a subscription feed through debounced intake into the reconciler,
//! runs the liveness monitor alongside it, and exposes the delivery sink plus
//! caller-facing confirm/refuse/defer operations.

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EngineConfig;
use crate::domain::ports::WorkQueueRemote;
use crate::services::delivery_sink::{DeliverySink, DeliverySinkConfig, FeedEvent};
use crate::services::liveness_monitor::{LivenessConfig, LivenessMonitor, MonitorStatus};
use crate::services::reconciler::{Reconciler, ReconcilerStats};
use crate::services::snapshot_intake::SnapshotIntake;
use crate::services::subscription::SubscriptionFeed;

/// Point-in-time view of the whole feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStats {
    pub tenant_id: String,
    pub ready: bool,
    pub cached_items: usize,
    pub reconciler: ReconcilerStats,
    pub monitor: MonitorStatus,
}

/// A running reconciliation engine for one tenant.
pub struct TaskFeed {
    tenant_id: Arc<str>,
    remote: Arc<dyn WorkQueueRemote>,
    sink: Arc<DeliverySink>,
    reconciler: Arc<Reconciler>,
    monitor: Arc<LivenessMonitor>,
    ready: watch::Receiver<bool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl TaskFeed {
    /// Start the engine. Must be called from within a tokio runtime.
    ///
    /// `config` is expected to have passed [`ConfigLoader::validate_engine`](crate::infrastructure::config::ConfigLoader::validate_engine);
    /// a check interval below the monitor's minimum is clamped rather than
    /// rejected.
    ///
    /// Subscribe to the returned feed before the transport publishes its first
    /// snapshot to be sure to see the first delivery; the debounce window
    /// leaves room for that when subscribing right after `start`.
    pub fn start(
        tenant_id: impl Into<Arc<str>>,
        config: &EngineConfig,
        remote: Arc<dyn WorkQueueRemote>,
        feed: SubscriptionFeed,
    ) -> Self {
        let tenant_id: Arc<str> = tenant_id.into();
        let sink = Arc::new(DeliverySink::new(
            tenant_id.to_string(),
            DeliverySinkConfig {
                channel_capacity: config.event_channel_capacity,
            },
        ));
        let reconciler = Arc::new(Reconciler::new(
            tenant_id.clone(),
            remote.clone(),
            sink.clone(),
        ));

        let (snapshots, ready, connection) = feed.into_parts();
        let monitor = Arc::new(LivenessMonitor::new(
            reconciler.clone(),
            connection,
            LivenessConfig::from(config),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let intake = SnapshotIntake::new(reconciler.clone(), config.debounce_window())
            .start(snapshots, shutdown_tx.subscribe());
        let intake = tokio::spawn(async move {
            if let Err(err) = intake.await {
                tracing::error!(error = %err, "Snapshot intake task failed");
            }
        });
        let monitor_task = monitor.clone().start(shutdown_tx.subscribe());

        tracing::info!(tenant = %tenant_id, "Task feed started");

        Self {
            tenant_id,
            remote,
            sink,
            reconciler,
            monitor,
            ready,
            shutdown_tx,
            tasks: Mutex::new(vec![intake, monitor_task]),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Subscribe to deliveries, escalations and reported errors.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sink.subscribe()
    }

    /// Resolve once the transport reports the initial snapshot loaded.
    pub async fn ready(&self) -> DomainResult<()> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|loaded| *loaded)
            .await
            .map(|_| ())
            .map_err(|_| DomainError::ShutDown)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Acknowledge Notification-kind items by identity.
    pub async fn confirm(&self, ids: &[String]) -> DomainResult<()> {
        self.check_call("confirm", ids)?;
        Ok(self.remote.mark_processed(&self.tenant_id, ids).await?)
    }

    /// Decline Request-kind items by identity.
    pub async fn refuse(&self, ids: &[String]) -> DomainResult<()> {
        self.check_call("refuse", ids)?;
        Ok(self.remote.refuse(&self.tenant_id, ids).await?)
    }

    /// Ask the remote system to re-offer items later.
    pub async fn defer(&self, ids: &[String]) -> DomainResult<()> {
        self.check_call("defer", ids)?;
        Ok(self.remote.defer(&self.tenant_id, ids).await?)
    }

    fn check_call(&self, operation: &'static str, ids: &[String]) -> DomainResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DomainError::ShutDown);
        }
        if ids.is_empty() {
            return Err(DomainError::EmptyIdList(operation));
        }
        if ids.iter().any(String::is_empty) {
            return Err(DomainError::MissingIdentity);
        }
        Ok(())
    }

    pub async fn stats(&self) -> FeedStats {
        FeedStats {
            tenant_id: self.tenant_id.to_string(),
            ready: self.is_ready(),
            cached_items: self.reconciler.cache_len().await,
            reconciler: self.reconciler.stats().await,
            monitor: self.monitor.status().await,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn sink(&self) -> &Arc<DeliverySink> {
        &self.sink
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn monitor(&self) -> &Arc<LivenessMonitor> {
        &self.monitor
    }

    /// Stop accepting snapshots and stop the liveness timer.
    ///
    /// Waits for the intake and monitor tasks to exit. Reconciliation passes
    /// already started run to completion before this returns. Calling this
    /// twice is harmless.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "Task feed background task ended abnormally");
            }
        }
        tracing::info!(tenant = %self.tenant_id, "Task feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::remote::InMemoryWorkQueueRemote;
    use crate::services::subscription::subscription_channel;

    #[tokio::test]
    async fn test_caller_preconditions_fail_before_remote_call() {
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let (_handle, feed) = subscription_channel();
        let task_feed = TaskFeed::start("t", &EngineConfig::default(), remote.clone(), feed);

        assert_eq!(
            task_feed.confirm(&[]).await,
            Err(DomainError::EmptyIdList("confirm"))
        );
        assert_eq!(
            task_feed.refuse(&[String::new()]).await,
            Err(DomainError::MissingIdentity)
        );
        assert_eq!(remote.call_count(), 0);

        task_feed.defer(&["a".to_string()]).await.unwrap();
        assert_eq!(remote.deferred_ids(), vec!["a"]);

        task_feed.shutdown().await;
        assert_eq!(
            task_feed.confirm(&["a".to_string()]).await,
            Err(DomainError::ShutDown)
        );
    }

    #[tokio::test]
    async fn test_ready_resolves_after_mark_ready() {
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let (handle, feed) = subscription_channel();
        let task_feed = TaskFeed::start("t", &EngineConfig::default(), remote, feed);

        assert!(!task_feed.is_ready());
        handle.mark_ready();
        task_feed.ready().await.unwrap();
        assert!(task_feed.is_ready());

        task_feed.shutdown().await;
        task_feed.shutdown().await;
    }

    #[tokio::test]
    async fn test_ready_fails_when_transport_goes_away() {
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let (handle, feed) = subscription_channel();
        let task_feed = TaskFeed::start("t", &EngineConfig::default(), remote, feed);

        drop(handle);
        assert_eq!(task_feed.ready().await, Err(DomainError::ShutDown));
        task_feed.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_check_interval_keeps_monitor_alive() {
        let remote = Arc::new(InMemoryWorkQueueRemote::new());
        let (_handle, feed) = subscription_channel();
        let config = EngineConfig {
            liveness_check_interval_ms: 0,
            ..EngineConfig::default()
        };
        let task_feed = TaskFeed::start("t", &config, remote, feed);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(task_feed.stats().await.monitor.running);

        task_feed.shutdown().await;
        assert!(!task_feed.stats().await.monitor.running);
    }
}
