//! Common test utilities for integration tests
//!
//! Provides a running feed wired to the in-memory remote, plus helpers for
//! pulling typed payloads off the delivery sink.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

use taskfeed::domain::models::EngineConfig;
use taskfeed::infrastructure::logging::LoggerImpl;
use taskfeed::infrastructure::remote::InMemoryWorkQueueRemote;
use taskfeed::services::{
    subscription_channel, FeedError, FeedEvent, FeedPayload, SubscriptionHandle, TaskFeed,
    WorkItemHandle,
};

/// Debounce window used by [`start_feed`].
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Comfortably longer than one debounce window plus a pass.
pub const SETTLE: Duration = Duration::from_millis(500);

/// A feed running against a recording remote.
pub struct Harness {
    pub transport: SubscriptionHandle,
    pub remote: Arc<InMemoryWorkQueueRemote>,
    pub feed: TaskFeed,
    pub events: broadcast::Receiver<FeedEvent>,
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    LoggerImpl::init_for_tests();
}

/// Engine timing matching the documented defaults, with the test debounce window.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        debounce_window_ms: DEBOUNCE.as_millis() as u64,
        liveness_check_interval_ms: 30_000,
        liveness_timeout_ms: 60_000,
        event_channel_capacity: 64,
    }
}

pub fn start_feed(tenant_id: &str) -> Harness {
    start_feed_with(tenant_id, &engine_config())
}

pub fn start_feed_with(tenant_id: &str, config: &EngineConfig) -> Harness {
    let remote = Arc::new(InMemoryWorkQueueRemote::new());
    let (transport, subscription) = subscription_channel();
    let feed = TaskFeed::start(tenant_id, config, remote.clone(), subscription);
    let events = feed.subscribe();
    Harness {
        transport,
        remote,
        feed,
        events,
    }
}

/// Next event already sitting in the channel, if any.
#[allow(dead_code)]
pub fn next_event(events: &mut broadcast::Receiver<FeedEvent>) -> Option<FeedPayload> {
    match events.try_recv() {
        Ok(event) => Some(event.payload),
        Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        Err(TryRecvError::Lagged(skipped)) => panic!("test receiver lagged by {skipped}"),
    }
}

/// Take the next event and require it to be a delivery.
#[allow(dead_code)]
pub fn expect_delivery(events: &mut broadcast::Receiver<FeedEvent>) -> Vec<WorkItemHandle> {
    match next_event(events) {
        Some(FeedPayload::ItemsDelivered { items, .. }) => items,
        Some(other) => panic!("expected delivery, got {}", other.variant_name()),
        None => panic!("expected delivery, channel empty"),
    }
}

/// Take the next event and require it to be an escalation; returns evicted ids.
#[allow(dead_code)]
pub fn expect_escalation(events: &mut broadcast::Receiver<FeedEvent>) -> Vec<String> {
    match next_event(events) {
        Some(FeedPayload::Escalation { items }) => items.into_iter().map(|i| i.id).collect(),
        Some(other) => panic!("expected escalation, got {}", other.variant_name()),
        None => panic!("expected escalation, channel empty"),
    }
}

/// Take the next event and require it to be a reported error.
#[allow(dead_code)]
pub fn expect_error(events: &mut broadcast::Receiver<FeedEvent>) -> FeedError {
    match next_event(events) {
        Some(FeedPayload::ErrorReported(error)) => error,
        Some(other) => panic!("expected error, got {}", other.variant_name()),
        None => panic!("expected error, channel empty"),
    }
}

pub fn ids(handles: &[WorkItemHandle]) -> Vec<&str> {
    handles.iter().map(WorkItemHandle::id).collect()
}
