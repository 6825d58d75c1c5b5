use async_trait::async_trait;

/// Error type for remote work-queue calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote rejected the call: {0}")]
    Rejected(String),

    #[error("Not connected to the remote work-queue")]
    Disconnected,
}

/// Remote operations the engine issues against a tenant's work-queue
///
/// Every call takes the tenant identifier and a batch of item identities.
/// Implementations own any retry or reconnect policy; the engine itself
/// never retries a failed call.
///
/// # Examples
///
/// ```no_run
/// use taskfeed::domain::ports::{RemoteError, WorkQueueRemote};
///
/// async fn confirm_all(remote: &dyn WorkQueueRemote, ids: &[String]) -> Result<(), RemoteError> {
///     remote.mark_processed("restaurant-7", ids).await
/// }
/// ```
#[async_trait]
pub trait WorkQueueRemote: Send + Sync {
    /// Acknowledge Notification-kind items as processed
    async fn mark_processed(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError>;

    /// Decline Request-kind items
    async fn refuse(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError>;

    /// Ask the remote system to re-offer items later
    async fn defer(&self, tenant_id: &str, ids: &[String]) -> Result<(), RemoteError>;
}
