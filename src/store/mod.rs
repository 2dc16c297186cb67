//! Storage ports for delivery tasks and profiles.
//!
//! The engine only reaches storage through these traits. Every write that the
//! engine relies on for correctness is conditional: the precondition is
//! checked by the store at write time, never from an earlier read.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
use crate::models::profile::Profile;

pub use memory::{InMemoryProfileDirectory, InMemoryTaskStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} already exists")]
    Duplicate(Uuid),

    #[error("claim spans more than one route")]
    CrossRoute,
}

/// One row of a batch claim: the task and the pickup sequence it should get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskClaim {
    pub task_id: Uuid,
    pub pickup_sequence: Option<u32>,
}

#[derive(Debug)]
pub enum ClaimOutcome {
    /// Every row was claimed; rows come back in claim order.
    Claimed(Vec<DeliveryTask>),
    /// At least one row was no longer Pending and unclaimed. Nothing was written.
    Conflict(DeliveryTask),
    /// A claimed row does not exist. Nothing was written.
    Missing(Uuid),
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(DeliveryTask),
    /// The row no longer matched the expected rider and status; it is returned as stored.
    Stale(DeliveryTask),
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<DeliveryStatus>,
    pub rider_id: Option<Uuid>,
    pub unclaimed_only: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &DeliveryTask) -> bool {
        self.status.is_none_or(|status| task.status == status)
            && self.rider_id.is_none_or(|rider| task.rider_id == Some(rider))
            && (!self.unclaimed_only || task.is_unclaimed())
    }
}

#[async_trait]
pub trait DeliveryTaskStore: Send + Sync {
    async fn insert(&self, task: DeliveryTask) -> Result<DeliveryTask, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryTask>, StoreError>;

    /// All tasks sharing `reference`, ordered by creation time ascending.
    /// Equal creation times keep the order the rows were stored in.
    async fn by_payment_reference(&self, reference: &str)
    -> Result<Vec<DeliveryTask>, StoreError>;

    /// Tasks matching `filter`, ordered by creation time ascending.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<DeliveryTask>, StoreError>;

    /// Assigns every claimed row to `rider_id` as one unit.
    ///
    /// Each row must still be Pending with no rider at write time, otherwise no
    /// row is touched. A row that already carries a pickup sequence keeps it.
    async fn claim(
        &self,
        claims: &[TaskClaim],
        rider_id: Uuid,
        assigned_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Moves one row from `from` to `to` if it is still held by `rider_id` in `from`.
    async fn transition(
        &self,
        id: Uuid,
        rider_id: Uuid,
        from: DeliveryStatus,
        to: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn insert(&self, profile: Profile) -> Result<Profile, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}
