//! Taskfeed - remote work-queue reconciliation
//!
//! Taskfeed turns a live subscription that reports the *full* list of pending
//! work items on every change into a de-duplicated, classified stream of
//! items the application can act on.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): work item models, errors and ports
//! - **Service Layer** (`services`): classifier, cache, debounced intake,
//!   single-flight reconciler, liveness monitor and delivery sink
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging and
//!   remote adapters
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskfeed::domain::models::{EngineConfig, RawWorkItem};
//! use taskfeed::infrastructure::remote::InMemoryWorkQueueRemote;
//! use taskfeed::services::{subscription_channel, FeedPayload, TaskFeed};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (transport, feed) = subscription_channel();
//!     let remote = Arc::new(InMemoryWorkQueueRemote::new());
//!     let task_feed = TaskFeed::start("restaurant-7", &EngineConfig::default(), remote, feed);
//!     let mut events = task_feed.subscribe();
//!
//!     transport.publish(vec![RawWorkItem::request("a", "create-order")])?;
//!     transport.mark_ready();
//!     task_feed.ready().await?;
//!
//!     if let FeedPayload::ItemsDelivered { items, .. } = events.recv().await?.payload {
//!         for item in items {
//!             item.refuse().await?;
//!         }
//!     }
//!     task_feed.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, EngineConfig, ItemKind, ItemStatus, LoggingConfig, NotificationTopic, RawWorkItem,
    RequestOperation, Snapshot, WorkItem, WorkKind,
};
pub use domain::ports::{ConnectionStatus, RemoteError, WorkQueueRemote};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    subscription_channel, FeedEvent, FeedPayload, SubscriptionHandle, TaskFeed, WorkItemHandle,
};
