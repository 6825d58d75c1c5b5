//! Work item domain models.
//!
//! A [`RawWorkItem`] is what the subscription transport hands us. Once the
//! classifier has accepted it, it becomes a [`WorkItem`] whose kind is a
//! tagged union over the closed sub-kind allow-lists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote-reported lifecycle status of a work item.
///
/// Informational only; the reconciliation engine never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Added,
    Processing,
    Processed,
    Failed,
    Refused,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Processing => write!(f, "processing"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
            Self::Refused => write!(f, "refused"),
        }
    }
}

/// Top-level kind of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Something already happened remotely; needs acknowledgment only.
    Notification,
    /// The remote system asks the local system to act.
    Request,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notification" => Ok(Self::Notification),
            "request" => Ok(Self::Request),
            other => Err(other.to_string()),
        }
    }
}

/// Declares a closed sub-kind allow-list with its wire tags.
macro_rules! sub_kind_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $tag:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl $name {
            /// Every recognized sub-kind, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire tag for this sub-kind.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                }
            }

            /// Look up a wire tag. Returns `None` for anything not on the allow-list.
            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

sub_kind_enum! {
    /// Recognized notification topics.
    NotificationTopic {
        OrderCreated => "order-created",
        OrderUpdated => "order-updated",
        OrderClosed => "order-closed",
        OrderItemCancelled => "order-item-cancelled",
        PaymentReceived => "payment-received",
        BillRequested => "bill-requested",
        WaiterCalled => "waiter-called",
        TableOpened => "table-opened",
        TableClosed => "table-closed",
    }
}

sub_kind_enum! {
    /// Recognized request operations.
    RequestOperation {
        Test => "test",
        GetTables => "get-tables",
        GetMenu => "get-menu",
        CreateOrder => "create-order",
        AddOrderItems => "add-order-items",
        CancelOrderItem => "cancel-order-item",
        PrintBill => "print-bill",
        PayOrder => "pay-order",
        CloseOrder => "close-order",
    }
}

/// Kind and sub-kind of an accepted work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sub_kind", rename_all = "lowercase")]
pub enum WorkKind {
    Notification(NotificationTopic),
    Request(RequestOperation),
}

impl WorkKind {
    pub fn item_kind(&self) -> ItemKind {
        match self {
            Self::Notification(_) => ItemKind::Notification,
            Self::Request(_) => ItemKind::Request,
        }
    }

    pub fn sub_kind(&self) -> &'static str {
        match self {
            Self::Notification(topic) => topic.as_str(),
            Self::Request(op) => op.as_str(),
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_kind(), self.sub_kind())
    }
}

/// A work item exactly as the subscription transport reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWorkItem {
    /// Primary identity, unique within the tenant's queue.
    pub id: String,

    /// Identity assigned by the local system the item was mirrored to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// `notification` or `request`. Anything else is rejected by the classifier.
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default)]
    pub status: ItemStatus,
}

impl RawWorkItem {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, sub_kind: Option<&str>) -> Self {
        Self {
            id: id.into(),
            external_id: None,
            kind: kind.into(),
            sub_kind: sub_kind.map(str::to_string),
            payload: serde_json::Value::Null,
            status: ItemStatus::Added,
        }
    }

    pub fn notification(id: impl Into<String>, topic: &str) -> Self {
        Self::new(id, ItemKind::Notification.as_str(), Some(topic))
    }

    pub fn request(id: impl Into<String>, operation: &str) -> Self {
        Self::new(id, ItemKind::Request.as_str(), Some(operation))
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// A well-formed work item destined for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub kind: WorkKind,
    pub payload: serde_json::Value,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn item_kind(&self) -> ItemKind {
        self.kind.item_kind()
    }

    pub fn sub_kind(&self) -> &'static str {
        self.kind.sub_kind()
    }

    /// Identity to use for caller-facing remote operations.
    ///
    /// The primary identity wins; the external identity is the fallback.
    /// Items coming out of [`classify`](crate::services::classify) always carry
    /// a primary identity, so the fallback only applies to items built
    /// directly by the caller.
    pub fn dispatch_id(&self) -> Option<&str> {
        if !self.id.is_empty() {
            return Some(&self.id);
        }
        self.external_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The full list of pending items for a tenant at one point in time.
pub type Snapshot = Vec<RawWorkItem>;
