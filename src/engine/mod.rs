pub mod assignment;
pub mod route;
pub mod transition;

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::models::delivery_task::DeliveryStatus;
use crate::notify::NotificationSink;
use crate::observability::metrics::Metrics;
use crate::store::{DeliveryTaskStore, ProfileDirectory, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rider {0} not found or not approved")]
    RiderNotFound(Uuid),

    #[error("delivery task {0} not found")]
    TaskNotFound(Uuid),

    #[error("delivery task {task_id} is not available (current status: {status})")]
    NotAvailable {
        task_id: Uuid,
        status: DeliveryStatus,
    },

    #[error("delivery task {0} is already assigned to a rider")]
    AlreadyAssigned(Uuid),

    #[error("rider zone {rider_zone} does not cover vendor zone(s) {}", .vendor_zones.join(", "))]
    ZoneMismatch {
        rider_zone: String,
        vendor_zones: Vec<String>,
    },

    #[error("delivery task {0} is not assigned to this rider")]
    Forbidden(Uuid),

    #[error("invalid status: {0}, expected Assigned/PickedUp/Delivered")]
    InvalidStatus(String),

    #[error("cannot move delivery task from {current} to {requested}")]
    InvalidTransition {
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },

    #[error(
        "stop {pickup_sequence} cannot be picked up before stop(s) {}",
        .waiting_on.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
    )]
    SequenceBlocked {
        pickup_sequence: u32,
        waiting_on: Vec<u32>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Metric label for the failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::RiderNotFound(_) | DispatchError::TaskNotFound(_) => "not_found",
            DispatchError::NotAvailable { .. } => "not_available",
            DispatchError::AlreadyAssigned(_) => "already_assigned",
            DispatchError::ZoneMismatch { .. } => "zone_mismatch",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::InvalidStatus(_) => "invalid_status",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::SequenceBlocked { .. } => "sequence_blocked",
            DispatchError::Store(_) => "error",
        }
    }
}

/// Entry point for rider-facing state changes.
///
/// Holds no state of its own; every decision is re-checked by the store at
/// write time.
#[derive(Clone)]
pub struct Dispatcher {
    tasks: Arc<dyn DeliveryTaskStore>,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn NotificationSink>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<dyn DeliveryTaskStore>,
        profiles: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn NotificationSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            tasks,
            profiles,
            notifier,
            metrics,
        }
    }
}
