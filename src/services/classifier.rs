//! Item classification.
//!
//! Decides, for an item not yet in the cache, whether it goes to the
//! application or is dispositioned automatically. Unrecognized sub-kinds are
//! never surfaced as errors: the remote side is told the notification was
//! processed (or the request refused) so its queue cannot grow without bound.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ItemKind, NotificationTopic, RawWorkItem, RequestOperation, WorkItem, WorkKind,
};

/// Outcome of classifying one raw item.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Well-formed; hand it to the application.
    Deliver(WorkItem),
    /// Notification with a missing or unrecognized topic.
    AutoConfirm,
    /// Request with a missing or unrecognized operation.
    AutoRefuse,
}

/// Classify a raw item against the recognized sub-kind allow-lists.
///
/// Returns [`DomainError::UnknownItemKind`] when the kind is neither
/// `notification` nor `request`, and [`DomainError::MissingIdentity`] when the
/// item has no primary identity to key the cache on. An external identity
/// does not stand in for a missing primary one.
pub fn classify(raw: &RawWorkItem) -> DomainResult<Disposition> {
    if raw.id.is_empty() {
        return Err(DomainError::MissingIdentity);
    }

    let kind: ItemKind = raw
        .kind
        .parse()
        .map_err(|kind| DomainError::UnknownItemKind {
            id: raw.id.clone(),
            kind,
        })?;

    let sub_kind = raw.sub_kind.as_deref();
    let work_kind = match kind {
        ItemKind::Notification => {
            match sub_kind.and_then(NotificationTopic::from_tag) {
                Some(topic) => WorkKind::Notification(topic),
                None => return Ok(Disposition::AutoConfirm),
            }
        }
        ItemKind::Request => match sub_kind.and_then(RequestOperation::from_tag) {
            Some(op) => WorkKind::Request(op),
            None => return Ok(Disposition::AutoRefuse),
        },
    };

    Ok(Disposition::Deliver(WorkItem {
        id: raw.id.clone(),
        external_id: raw.external_id.clone(),
        kind: work_kind,
        payload: raw.payload.clone(),
        status: raw.status,
    }))
}
