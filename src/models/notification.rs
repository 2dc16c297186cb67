use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Vendor: a rider is coming for this order.
    RiderAssigned,
    /// Rider: summary of the stops just claimed.
    RouteAssigned,
    /// Vendor: the rider collected this order.
    OrderPickedUp,
    /// Rider: pickup recorded.
    PickupConfirmed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationMetadata {
    pub order_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stops: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: NotificationMetadata,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: NotificationMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            title: title.into(),
            message: message.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}
