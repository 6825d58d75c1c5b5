//! Remote work-queue adapters

pub mod in_memory;

pub use in_memory::{InMemoryWorkQueueRemote, RemoteCall};
