//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces the engine consumes from the outside:
//! - WorkQueueRemote: confirm/refuse/defer calls against the remote work-queue
//! - ConnectionStatus: whether the subscription transport is currently connected
//!
//! Infrastructure adapters implement these so the engine stays independent
//! of any particular transport.

pub mod connection_status;
pub mod work_queue_remote;

pub use connection_status::ConnectionStatus;
pub use work_queue_remote::{RemoteError, WorkQueueRemote};
