//! Delivery sink: the observable boundary exposed to application code.
//!
//! A broadcast-based event bus with sequence numbering. It carries three kinds
//! of payload: batches of newly deliverable items (one per reconciliation
//! pass), escalation notices (one per liveness-monitor eviction), and errors
//! the engine swallowed while keeping a pass or a tick alive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::WorkItem;
use crate::services::work_item_handle::WorkItemHandle;

/// Unique identifier for a feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation during which an engine-internal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOperation {
    Classify,
    AutoConfirm,
    AutoRefuse,
    Defer,
    /// A whole reconciliation pass aborted.
    Reconcile,
}

impl fmt::Display for FeedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => write!(f, "classify"),
            Self::AutoConfirm => write!(f, "auto_confirm"),
            Self::AutoRefuse => write!(f, "auto_refuse"),
            Self::Defer => write!(f, "defer"),
            Self::Reconcile => write!(f, "reconcile"),
        }
    }
}

/// An error the engine reported instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedError {
    pub operation: FeedOperation,
    /// Identities affected by the failure.
    pub ids: Vec<String>,
    pub message: String,
}

/// Event payload.
#[derive(Debug, Clone)]
pub enum FeedPayload {
    /// New deliverable items from one reconciliation pass, in snapshot order.
    ItemsDelivered { pass: u64, items: Vec<WorkItemHandle> },
    /// Items evicted by one liveness-monitor tick.
    Escalation { items: Vec<WorkItem> },
    /// A remote-call or classification failure.
    ErrorReported(FeedError),
}

impl FeedPayload {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ItemsDelivered { .. } => "items_delivered",
            Self::Escalation { .. } => "escalation",
            Self::ErrorReported(_) => "error_reported",
        }
    }
}

/// Event envelope containing all event metadata.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub payload: FeedPayload,
}

/// Configuration for the delivery sink.
#[derive(Debug, Clone)]
pub struct DeliverySinkConfig {
    /// Capacity of the broadcast channel; slow subscribers lag past this.
    pub channel_capacity: usize,
}

impl Default for DeliverySinkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Fan-out notification point for the application.
pub struct DeliverySink {
    tenant_id: String,
    sender: broadcast::Sender<FeedEvent>,
    sequence: AtomicU64,
}

impl DeliverySink {
    pub fn new(tenant_id: impl Into<String>, config: DeliverySinkConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            tenant_id: tenant_id.into(),
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload, assigning the next sequence number.
    pub fn publish(&self, payload: FeedPayload) -> SequenceNumber {
        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        let event = FeedEvent {
            id: EventId::new(),
            sequence,
            timestamp: Utc::now(),
            tenant_id: self.tenant_id.clone(),
            payload,
        };

        tracing::trace!(
            tenant = %self.tenant_id,
            sequence = %sequence,
            kind = event.payload.variant_name(),
            "Publishing feed event"
        );

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(event);
        sequence
    }

    pub fn deliver(&self, pass: u64, items: Vec<WorkItemHandle>) -> SequenceNumber {
        self.publish(FeedPayload::ItemsDelivered { pass, items })
    }

    pub fn escalate(&self, items: Vec<WorkItem>) -> SequenceNumber {
        self.publish(FeedPayload::Escalation { items })
    }

    pub fn report_error(
        &self,
        operation: FeedOperation,
        ids: Vec<String>,
        message: impl Into<String>,
    ) -> SequenceNumber {
        self.publish(FeedPayload::ErrorReported(FeedError {
            operation,
            ids,
            message: message.into(),
        }))
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    /// Sequence number the next event will receive.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}
