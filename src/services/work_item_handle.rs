//! Application-facing handle for a delivered work item.

use std::fmt;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ItemKind, WorkItem, WorkKind};
use crate::domain::ports::WorkQueueRemote;

/// A delivered work item plus the operations the application may perform on it.
///
/// Handles are cheap to clone; every subscriber of the delivery sink gets its
/// own copy of the same batch.
#[derive(Clone)]
pub struct WorkItemHandle {
    item: WorkItem,
    tenant_id: Arc<str>,
    remote: Arc<dyn WorkQueueRemote>,
}

impl WorkItemHandle {
    pub fn new(item: WorkItem, tenant_id: Arc<str>, remote: Arc<dyn WorkQueueRemote>) -> Self {
        Self {
            item,
            tenant_id,
            remote,
        }
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn kind(&self) -> WorkKind {
        self.item.kind
    }

    pub fn sub_kind(&self) -> &'static str {
        self.item.sub_kind()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.item.payload
    }

    /// Acknowledge a Notification-kind item.
    pub async fn confirm(&self) -> DomainResult<()> {
        let id = self.require(ItemKind::Notification, "confirm")?;
        tracing::debug!(tenant = %self.tenant_id, id = %id, "Confirming work item");
        self.remote
            .mark_processed(&self.tenant_id, &[id])
            .await
            .map_err(DomainError::from)
    }

    /// Decline a Request-kind item.
    pub async fn refuse(&self) -> DomainResult<()> {
        let id = self.require(ItemKind::Request, "refuse")?;
        tracing::debug!(tenant = %self.tenant_id, id = %id, "Refusing work item");
        self.remote
            .refuse(&self.tenant_id, &[id])
            .await
            .map_err(DomainError::from)
    }

    /// Ask the remote system to re-offer this item later.
    pub async fn defer(&self) -> DomainResult<()> {
        let id = self.dispatch_id()?;
        tracing::debug!(tenant = %self.tenant_id, id = %id, "Deferring work item");
        self.remote
            .defer(&self.tenant_id, &[id])
            .await
            .map_err(DomainError::from)
    }

    fn dispatch_id(&self) -> DomainResult<String> {
        self.item
            .dispatch_id()
            .map(str::to_string)
            .ok_or(DomainError::MissingIdentity)
    }

    // Preconditions are checked before any remote call is attempted.
    fn require(&self, expected: ItemKind, operation: &'static str) -> DomainResult<String> {
        let id = self.dispatch_id()?;
        if self.item.item_kind() != expected {
            return Err(DomainError::WrongKind {
                id,
                kind: self.item.item_kind().to_string(),
                operation,
            });
        }
        Ok(id)
    }
}

impl fmt::Debug for WorkItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemHandle")
            .field("tenant_id", &self.tenant_id)
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}
