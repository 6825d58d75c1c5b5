//! Boundary between the subscription transport and the engine.
//!
//! The transport adapter holds a [`SubscriptionHandle`] and pushes the full
//! current list of items on every change. The engine consumes the matching
//! [`SubscriptionFeed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Snapshot;
use crate::domain::ports::ConnectionStatus;

/// Create a connected handle/feed pair. The transport starts out connected.
pub fn subscription_channel() -> (SubscriptionHandle, SubscriptionFeed) {
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = watch::channel(false);
    let connected = Arc::new(AtomicBool::new(true));

    (
        SubscriptionHandle {
            snapshots: snapshot_tx,
            ready: ready_tx,
            connected: connected.clone(),
        },
        SubscriptionFeed {
            snapshots: snapshot_rx,
            ready: ready_rx,
            connected,
        },
    )
}

/// Transport-side half: publishes snapshots, readiness and connection state.
#[derive(Debug)]
pub struct SubscriptionHandle {
    snapshots: mpsc::UnboundedSender<Snapshot>,
    ready: watch::Sender<bool>,
    connected: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Report the full current list of pending items.
    pub fn publish(&self, snapshot: Snapshot) -> DomainResult<()> {
        self.snapshots
            .send(snapshot)
            .map_err(|_| DomainError::ShutDown)
    }

    /// Signal that the initial full snapshot has been loaded.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::AcqRel);
        if previous != connected {
            tracing::info!(connected, "Subscription connection state changed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the engine side is still consuming snapshots.
    pub fn is_closed(&self) -> bool {
        self.snapshots.is_closed()
    }
}

/// Engine-side half.
#[derive(Debug)]
pub struct SubscriptionFeed {
    pub(crate) snapshots: mpsc::UnboundedReceiver<Snapshot>,
    pub(crate) ready: watch::Receiver<bool>,
    pub(crate) connected: Arc<AtomicBool>,
}

impl SubscriptionFeed {
    /// Connection state as seen by the liveness monitor.
    pub fn connection(&self) -> Arc<dyn ConnectionStatus> {
        self.connected.clone()
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<Snapshot>,
        watch::Receiver<bool>,
        Arc<dyn ConnectionStatus>,
    ) {
        let connection: Arc<dyn ConnectionStatus> = self.connected;
        (self.snapshots, self.ready, connection)
    }
}
