use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
}

impl DeliveryStatus {
    /// The only status a task may move to from this one.
    pub fn next(self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Pending => Some(DeliveryStatus::Assigned),
            DeliveryStatus::Assigned => Some(DeliveryStatus::PickedUp),
            DeliveryStatus::PickedUp => Some(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered => None,
        }
    }

    pub fn is_picked_up(self) -> bool {
        matches!(self, DeliveryStatus::PickedUp | DeliveryStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Assigned => "Assigned",
            DeliveryStatus::PickedUp => "PickedUp",
            DeliveryStatus::Delivered => "Delivered",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown status: {}, expected Pending/Assigned/PickedUp/Delivered",
            self.0
        )
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(DeliveryStatus::Pending),
            "Assigned" => Ok(DeliveryStatus::Assigned),
            "PickedUp" => Ok(DeliveryStatus::PickedUp),
            "Delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One vendor-to-customer leg of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub rider_id: Option<Uuid>,
    /// Shared by every task of one multi-vendor checkout.
    pub payment_reference: Option<String>,
    pub vendor_location: Option<String>,
    pub pickup_sequence: Option<u32>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryTask {
    pub fn new(
        order_id: Uuid,
        vendor_id: Uuid,
        payment_reference: Option<String>,
        vendor_location: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            vendor_id,
            rider_id: None,
            payment_reference: payment_reference.filter(|r| !r.trim().is_empty()),
            vendor_location,
            pickup_sequence: None,
            status: DeliveryStatus::Pending,
            created_at: Utc::now(),
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
        }
    }

    /// Still Pending and not held by any rider.
    pub fn is_unclaimed(&self) -> bool {
        self.status == DeliveryStatus::Pending && self.rider_id.is_none()
    }

    /// Moves the task into `status`, stamping the matching timestamp on first entry.
    pub fn enter_status(&mut self, status: DeliveryStatus, at: DateTime<Utc>) {
        self.status = status;
        let stamp = match status {
            DeliveryStatus::Pending => return,
            DeliveryStatus::Assigned => &mut self.assigned_at,
            DeliveryStatus::PickedUp => &mut self.picked_up_at,
            DeliveryStatus::Delivered => &mut self.delivered_at,
        };
        if stamp.is_none() {
            *stamp = Some(at);
        }
    }
}
