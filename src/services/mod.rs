//! Service layer: the reconciliation and delivery engine.
//!
//! Leaf-first:
//! - `classifier`: pure deliver / auto-confirm / auto-refuse decision
//! - `reconciliation_cache`: identity-keyed cache of delivered items
//! - `delivery_sink`: broadcast boundary toward application code
//! - `reconciler`: single-flight reconciliation passes
//! - `snapshot_intake`: debounced coalescing of snapshot notifications
//! - `liveness_monitor`: periodic eviction of stuck items
//! - `task_feed`: facade wiring all of the above to a subscription

pub mod classifier;
pub mod delivery_sink;
pub mod liveness_monitor;
pub mod reconciler;
pub mod reconciliation_cache;
pub mod snapshot_intake;
pub mod subscription;
pub mod task_feed;
pub mod work_item_handle;

pub use classifier::{classify, Disposition};
pub use delivery_sink::{DeliverySink, DeliverySinkConfig, FeedError, FeedEvent, FeedOperation, FeedPayload};
pub use liveness_monitor::{LivenessConfig, LivenessMonitor, MonitorStatus, TickOutcome};
pub use reconciler::{Reconciler, ReconcilerStats, SubmitOutcome};
pub use reconciliation_cache::{CachedItem, ReconciliationCache};
pub use snapshot_intake::{IntakeReport, SnapshotIntake};
pub use subscription::{subscription_channel, SubscriptionFeed, SubscriptionHandle};
pub use task_feed::{FeedStats, TaskFeed};
pub use work_item_handle::WorkItemHandle;
