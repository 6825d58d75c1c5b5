//! In-memory recording remote for testing and replay

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::domain::ports::{RemoteError, WorkQueueRemote};

/// One recorded call against the remote work-queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RemoteCall {
    MarkProcessed { tenant_id: String, ids: Vec<String> },
    Refuse { tenant_id: String, ids: Vec<String> },
    Defer { tenant_id: String, ids: Vec<String> },
}

impl RemoteCall {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::MarkProcessed { .. } => "mark_processed",
            Self::Refuse { .. } => "refuse",
            Self::Defer { .. } => "defer",
        }
    }

    pub fn ids(&self) -> &[String] {
        match self {
            Self::MarkProcessed { ids, .. } | Self::Refuse { ids, .. } | Self::Defer { ids, .. } => ids,
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    mark_processed: Option<RemoteError>,
    refuse: Option<RemoteError>,
    defer: Option<RemoteError>,
}

/// Remote work-queue that records every call and never touches the network
///
/// Failures can be injected per operation, and [`pause`](Self::pause) holds
/// every subsequent call open (after recording it) until
/// [`resume`](Self::resume) is called.
pub struct InMemoryWorkQueueRemote {
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<Failures>,
    gate: watch::Sender<bool>,
}

impl InMemoryWorkQueueRemote {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            gate,
        }
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }

    pub fn processed_ids(&self) -> Vec<String> {
        self.ids_for("mark_processed")
    }

    pub fn refused_ids(&self) -> Vec<String> {
        self.ids_for("refuse")
    }

    pub fn deferred_ids(&self) -> Vec<String> {
        self.ids_for("defer")
    }

    pub fn fail_mark_processed_with(&self, error: RemoteError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.mark_processed = Some(error);
        }
    }

    pub fn fail_refuse_with(&self, error: RemoteError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.refuse = Some(error);
        }
    }

    pub fn fail_defer_with(&self, error: RemoteError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.defer = Some(error);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures = Failures::default();
        }
    }

    /// Hold subsequent calls open until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume(&self) {
        self.gate.send_replace(false);
    }

    fn ids_for(&self, operation: &str) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .flat_map(|call| call.ids().iter().cloned())
            .collect()
    }

    async fn record(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let operation = call.operation();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|paused| !*paused).await;

        let failure = self.failures.lock().ok().and_then(|failures| match operation {
            "mark_processed" => failures.mark_processed.clone(),
            "refuse" => failures.refuse.clone(),
            _ => failures.defer.clone(),
        });
        failure.map_or(Ok(()), Err)
    }
}

impl Default for InMemoryWorkQueueRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueueRemote for InMemoryWorkQueueRemote {
    async fn mark_processed(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        self.record(RemoteCall::MarkProcessed {
            tenant_id: tenant_id.to_string(),
            ids: ids.to_vec(),
        })
        .await
    }

    async fn refuse(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        self.record(RemoteCall::Refuse {
            tenant_id: tenant_id.to_string(),
            ids: ids.to_vec(),
        })
        .await
    }

    async fn defer(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        self.record(RemoteCall::Defer {
            tenant_id: tenant_id.to_string(),
            ids: ids.to_vec(),
        })
        .await
    }
}
