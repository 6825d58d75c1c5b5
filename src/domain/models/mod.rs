pub mod config;
pub mod work_item;

pub use config::{Config, EngineConfig, LoggingConfig};
pub use work_item::{
    ItemKind, ItemStatus, NotificationTopic, RawWorkItem, RequestOperation, Snapshot, WorkItem,
    WorkKind,
};
