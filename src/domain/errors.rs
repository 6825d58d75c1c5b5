//! Domain errors for the Taskfeed engine.

use thiserror::Error;

use super::ports::RemoteError;

/// Domain-level errors that can occur in the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Unknown item kind '{kind}' for item {id}")]
    UnknownItemKind { id: String, kind: String },

    #[error("Work item has neither a primary nor an external identity")]
    MissingIdentity,

    #[error("Operation '{0}' requires at least one item id")]
    EmptyIdList(&'static str),

    #[error("Cannot {operation} item {id}: it is a {kind} item")]
    WrongKind {
        id: String,
        kind: String,
        operation: &'static str,
    },

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Task feed has been shut down")]
    ShutDown,
}

pub type DomainResult<T> = Result<T, DomainError>;
