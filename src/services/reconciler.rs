//! Single-flight reconciliation of full snapshots against the local cache.
//!
//! The reconciler is a two-slot state machine: an in-flight slot (is a pass
//! running?) and a pending slot of capacity one. A snapshot submitted while a
//! pass runs replaces whatever is pending, so a burst of N snapshots during one
//! pass produces at most one follow-up pass, on the last of them.
//!
//! Every pass holds the cache mutex for its whole duration, including the
//! auto-disposition calls. The liveness monitor takes the same mutex, which is
//! what serializes monitor ticks against passes.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::Instrument;

use crate::domain::models::{Snapshot, WorkItem};
use crate::domain::ports::WorkQueueRemote;
use crate::services::classifier::{classify, Disposition};
use crate::services::delivery_sink::{DeliverySink, FeedOperation};
use crate::services::reconciliation_cache::ReconciliationCache;
use crate::services::work_item_handle::WorkItemHandle;

/// Counters describing reconciler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub snapshots_submitted: u64,
    /// Pending snapshots replaced by a newer one before their pass started.
    pub snapshots_superseded: u64,
    pub passes_run: u64,
    pub items_delivered: u64,
    pub items_removed: u64,
    pub auto_confirmed: u64,
    pub auto_refused: u64,
    /// Items dropped because they could not be classified.
    pub items_dropped: u64,
    pub disposition_failures: u64,
    /// Passes that panicked before finishing.
    pub passes_aborted: u64,
}

/// Result of handing a snapshot to [`Reconciler::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The caller became the driver and ran `passes` passes until nothing was pending.
    Drained { passes: u64 },
    /// A pass was already running; the snapshot now occupies the pending slot.
    Queued { superseded: bool },
}

/// What one pass did.
#[derive(Debug, Clone, Default)]
struct PassReport {
    removed: usize,
    delivered: usize,
    auto_confirmed: usize,
    auto_refused: usize,
    dropped: usize,
    failures: usize,
}

/// Outcome of [`Reconciler::claim`].
pub(crate) enum SlotAction {
    Park { superseded: bool },
    Drive(Snapshot),
}

#[derive(Debug, Default)]
struct FlightSlots {
    running: bool,
    pending: Option<Snapshot>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "pass panicked".to_string()
    }
}

/// Serialized reconciliation engine for one tenant.
pub struct Reconciler {
    tenant_id: Arc<str>,
    remote: Arc<dyn WorkQueueRemote>,
    sink: Arc<DeliverySink>,
    cache: Mutex<ReconciliationCache>,
    slots: std::sync::Mutex<FlightSlots>,
    pass_counter: AtomicU64,
    stats: RwLock<ReconcilerStats>,
}

impl Reconciler {
    pub fn new(
        tenant_id: impl Into<Arc<str>>,
        remote: Arc<dyn WorkQueueRemote>,
        sink: Arc<DeliverySink>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            remote,
            sink,
            cache: Mutex::new(ReconciliationCache::new()),
            slots: std::sync::Mutex::new(FlightSlots::default()),
            pass_counter: AtomicU64::new(0),
            stats: RwLock::new(ReconcilerStats::default()),
        }
    }

    /// Submit a full snapshot.
    ///
    /// If no pass is running, the caller drives passes until the pending slot
    /// is empty and gets [`SubmitOutcome::Drained`]. Otherwise the snapshot
    /// replaces the pending one and this returns immediately.
    ///
    /// A pass is not cancellable: callers should run this on its own task
    /// rather than inside a `select!` that may drop it.
    pub async fn submit(&self, snapshot: Snapshot) -> SubmitOutcome {
        let slot = self.claim(snapshot);
        self.complete(slot).await
    }

    /// Decide synchronously whether `snapshot` starts a pass or takes the
    /// pending slot. Claims made in order are applied in that order.
    pub(crate) fn claim(&self, snapshot: Snapshot) -> SlotAction {
        let mut slots = self.lock_slots();
        if slots.running {
            SlotAction::Park {
                superseded: slots.pending.replace(snapshot).is_some(),
            }
        } else {
            slots.running = true;
            SlotAction::Drive(snapshot)
        }
    }

    /// Finish a claim: record it, and drive passes if it won the in-flight slot.
    pub(crate) async fn complete(&self, slot: SlotAction) -> SubmitOutcome {
        self.stats.write().await.snapshots_submitted += 1;

        match slot {
            SlotAction::Park { superseded } => {
                if superseded {
                    self.stats.write().await.snapshots_superseded += 1;
                }
                tracing::debug!(
                    tenant = %self.tenant_id,
                    superseded,
                    "Pass in flight, snapshot parked in pending slot"
                );
                SubmitOutcome::Queued { superseded }
            }
            SlotAction::Drive(snapshot) => SubmitOutcome::Drained {
                passes: self.drive(snapshot).await,
            },
        }
    }

    async fn drive(&self, first: Snapshot) -> u64 {
        let mut passes = 0;
        let mut next = Some(first);
        while let Some(snapshot) = next {
            let item_ids: Vec<String> = snapshot.iter().map(|raw| raw.id.clone()).collect();
            // A panicking remote adapter must not leave the in-flight slot set.
            if let Err(panic) = AssertUnwindSafe(self.run_pass(snapshot)).catch_unwind().await {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    tenant = %self.tenant_id,
                    error = %message,
                    "Reconciliation pass panicked"
                );
                self.stats.write().await.passes_aborted += 1;
                self.sink.report_error(FeedOperation::Reconcile, item_ids, message);
            }
            passes += 1;

            let mut slots = self.lock_slots();
            next = slots.pending.take();
            if next.is_none() {
                slots.running = false;
            }
        }
        passes
    }

    async fn run_pass(&self, snapshot: Snapshot) {
        let pass = self.pass_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let span = tracing::debug_span!("reconcile", tenant = %self.tenant_id, pass);

        async {
            let mut cache = self.cache.lock().await;
            let report = self.reconcile(pass, snapshot, &mut cache).await;
            drop(cache);

            tracing::debug!(
                removed = report.removed,
                delivered = report.delivered,
                auto_confirmed = report.auto_confirmed,
                auto_refused = report.auto_refused,
                dropped = report.dropped,
                "Reconciliation pass finished"
            );

            let mut stats = self.stats.write().await;
            stats.passes_run += 1;
            stats.items_removed += report.removed as u64;
            stats.items_delivered += report.delivered as u64;
            stats.auto_confirmed += report.auto_confirmed as u64;
            stats.auto_refused += report.auto_refused as u64;
            stats.items_dropped += report.dropped as u64;
            stats.disposition_failures += report.failures as u64;
        }
        .instrument(span)
        .await;
    }

    async fn reconcile(
        &self,
        pass: u64,
        snapshot: Snapshot,
        cache: &mut ReconciliationCache,
    ) -> PassReport {
        let mut report = PassReport::default();

        if snapshot.is_empty() {
            report.removed = cache.len();
            cache.clear();
            tracing::debug!(cleared = report.removed, "Empty snapshot, cache reset");
            return report;
        }

        let present: HashSet<&str> = snapshot.iter().map(|raw| raw.id.as_str()).collect();
        let removed = cache.remove_all_except(&present);
        if !removed.is_empty() {
            tracing::debug!(ids = ?removed, "Items left the snapshot");
        }
        report.removed = removed.len();

        let now = Instant::now();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut to_deliver: Vec<WorkItem> = Vec::new();
        let mut to_confirm: Vec<String> = Vec::new();
        let mut to_refuse: Vec<String> = Vec::new();

        for raw in &snapshot {
            if !seen.insert(raw.id.as_str()) || cache.contains(&raw.id) {
                continue;
            }
            match classify(raw) {
                Ok(Disposition::Deliver(item)) => {
                    cache.upsert(item.clone(), now);
                    to_deliver.push(item);
                }
                Ok(Disposition::AutoConfirm) => to_confirm.push(raw.id.clone()),
                Ok(Disposition::AutoRefuse) => to_refuse.push(raw.id.clone()),
                Err(err) => {
                    tracing::error!(id = %raw.id, kind = %raw.kind, error = %err, "Dropping unclassifiable item");
                    self.sink
                        .report_error(FeedOperation::Classify, vec![raw.id.clone()], err.to_string());
                    report.dropped += 1;
                }
            }
        }

        // Both batches go out together; a failure in one does not hold back the other.
        let (confirmed, refused) = tokio::join!(
            self.dispose(FeedOperation::AutoConfirm, &to_confirm),
            self.dispose(FeedOperation::AutoRefuse, &to_refuse),
        );
        report.auto_confirmed = to_confirm.len();
        report.auto_refused = to_refuse.len();
        report.failures = usize::from(!confirmed) + usize::from(!refused);

        if !to_deliver.is_empty() {
            report.delivered = to_deliver.len();
            let handles = to_deliver
                .into_iter()
                .map(|item| WorkItemHandle::new(item, self.tenant_id.clone(), self.remote.clone()))
                .collect();
            self.sink.deliver(pass, handles);
        }

        report
    }

    /// Issue one batched auto-disposition call. Returns `false` if it failed.
    async fn dispose(&self, operation: FeedOperation, ids: &[String]) -> bool {
        if ids.is_empty() {
            return true;
        }

        let result = match operation {
            FeedOperation::AutoRefuse => self.remote.refuse(&self.tenant_id, ids).await,
            _ => self.remote.mark_processed(&self.tenant_id, ids).await,
        };

        match result {
            Ok(()) => {
                tracing::info!(operation = %operation, ids = ?ids, "Auto-disposition issued");
                true
            }
            Err(err) => {
                tracing::warn!(operation = %operation, ids = ?ids, error = %err, "Auto-disposition failed");
                self.sink.report_error(operation, ids.to_vec(), err.to_string());
                false
            }
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, FlightSlots> {
        // No code path panics while holding this lock; recover the data regardless.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a pass is currently in flight.
    pub fn is_running(&self) -> bool {
        self.lock_slots().running
    }

    /// Whether a snapshot is waiting for the next pass.
    pub fn has_pending(&self) -> bool {
        self.lock_slots().pending.is_some()
    }

    /// Identities currently cached, sorted.
    pub async fn cached_ids(&self) -> Vec<String> {
        self.cache.lock().await.ids()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn stats(&self) -> ReconcilerStats {
        self.stats.read().await.clone()
    }

    pub fn tenant_id(&self) -> &Arc<str> {
        &self.tenant_id
    }

    pub fn remote(&self) -> &Arc<dyn WorkQueueRemote> {
        &self.remote
    }

    pub fn sink(&self) -> &Arc<DeliverySink> {
        &self.sink
    }

    /// The cache mutex shared with the liveness monitor.
    pub(crate) fn cache(&self) -> &Mutex<ReconciliationCache> {
        &self.cache
    }
}
