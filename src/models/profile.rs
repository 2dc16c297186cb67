use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Vendor,
    Customer,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Operating zone for riders, business zone for vendors.
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_rider(&self) -> bool {
        self.role == Role::Rider
    }
}
