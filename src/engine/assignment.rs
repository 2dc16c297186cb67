use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::route::{group_and_sequence, stop_label};
use crate::engine::{DispatchError, Dispatcher};
use crate::geo::mismatched_zones;
use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
use crate::models::notification::{Notification, NotificationKind, NotificationMetadata};
use crate::models::profile::Profile;
use crate::notify::fan_out;
use crate::store::ClaimOutcome;

#[derive(Debug, Clone)]
pub struct AcceptedTask {
    /// The task the rider asked for, as stored after the claim.
    pub task: DeliveryTask,
    /// Every task claimed by this call, in pickup order.
    pub assigned: Vec<DeliveryTask>,
    pub total_stops: usize,
    pub is_grouped: bool,
}

impl Dispatcher {
    /// Assigns `task_id`, and every unclaimed task of its route, to `rider_id`.
    pub async fn accept_task(
        &self,
        task_id: Uuid,
        rider_id: Uuid,
    ) -> Result<AcceptedTask, DispatchError> {
        let start = Instant::now();
        let result = self.claim_route(task_id, rider_id).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(accepted) => {
                self.metrics.observe("accept", "success", elapsed);
                self.metrics
                    .tasks_assigned_total
                    .inc_by(accepted.assigned.len() as u64);
            }
            Err(err) => {
                self.metrics.observe("accept", err.outcome(), elapsed);
                warn!(
                    task_id = %task_id,
                    rider_id = %rider_id,
                    error = %err,
                    "task acceptance rejected"
                );
            }
        }

        let accepted = result?;
        let mut events = vendor_assignment_events(&accepted);
        events.push(rider_route_event(rider_id, &accepted));
        fan_out(self.notifier.as_ref(), &self.metrics, events).await;

        Ok(accepted)
    }

    async fn claim_route(
        &self,
        task_id: Uuid,
        rider_id: Uuid,
    ) -> Result<AcceptedTask, DispatchError> {
        let rider = self
            .profiles
            .get(rider_id)
            .await?
            .filter(Profile::is_rider)
            .ok_or(DispatchError::RiderNotFound(rider_id))?;

        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(DispatchError::TaskNotFound(task_id))?;

        if task.status != DeliveryStatus::Pending {
            return Err(DispatchError::NotAvailable {
                task_id,
                status: task.status,
            });
        }
        if task.rider_id.is_some() {
            return Err(DispatchError::AlreadyAssigned(task_id));
        }

        let plan = group_and_sequence(self.tasks.as_ref(), &task).await?;

        let conflicts = mismatched_zones(
            rider.location.as_deref(),
            plan.members
                .iter()
                .map(|member| member.vendor_location.as_deref()),
        );
        if !conflicts.is_empty() {
            let mut vendor_zones: Vec<String> = Vec::new();
            for zone in conflicts {
                if !vendor_zones.iter().any(|seen| seen == zone) {
                    vendor_zones.push(zone.to_string());
                }
            }
            return Err(DispatchError::ZoneMismatch {
                rider_zone: rider.location.unwrap_or_default(),
                vendor_zones,
            });
        }

        let assigned_at = Utc::now();
        let assigned = match self.tasks.claim(&plan.claims, rider_id, assigned_at).await? {
            ClaimOutcome::Claimed(rows) => rows,
            ClaimOutcome::Conflict(row) if row.rider_id.is_some() => {
                return Err(DispatchError::AlreadyAssigned(task_id));
            }
            ClaimOutcome::Conflict(row) => {
                return Err(DispatchError::NotAvailable {
                    task_id,
                    status: row.status,
                });
            }
            ClaimOutcome::Missing(missing) => return Err(DispatchError::TaskNotFound(missing)),
        };

        let task = assigned
            .iter()
            .find(|row| row.id == task_id)
            .cloned()
            .ok_or(DispatchError::TaskNotFound(task_id))?;

        info!(
            task_id = %task_id,
            rider_id = %rider_id,
            payment_reference = task.payment_reference.as_deref().unwrap_or("-"),
            claimed = assigned.len(),
            total_stops = plan.total_stops(),
            "delivery route assigned"
        );

        Ok(AcceptedTask {
            task,
            assigned,
            total_stops: plan.total_stops(),
            is_grouped: plan.is_grouped,
        })
    }
}

/// One event per vendor, pointing at that vendor's first stop in the batch.
fn vendor_assignment_events(accepted: &AcceptedTask) -> Vec<Notification> {
    let mut seen = HashSet::new();
    accepted
        .assigned
        .iter()
        .filter(|task| seen.insert(task.vendor_id))
        .map(|task| {
            let message = match task.pickup_sequence {
                Some(sequence) => format!(
                    "A rider is on the way to collect order {} ({}).",
                    task.order_id,
                    stop_label(sequence, accepted.total_stops)
                ),
                None => format!("A rider is on the way to collect order {}.", task.order_id),
            };
            Notification::new(
                task.vendor_id,
                NotificationKind::RiderAssigned,
                "Rider assigned",
                message,
                NotificationMetadata {
                    order_id: task.order_id,
                    payment_reference: task.payment_reference.clone(),
                    pickup_sequence: task.pickup_sequence,
                    total_stops: Some(accepted.total_stops),
                },
            )
        })
        .collect()
}

fn rider_route_event(rider_id: Uuid, accepted: &AcceptedTask) -> Notification {
    let stops = accepted.assigned.len();
    let message = if accepted.is_grouped {
        format!(
            "You have {stops} pickup stop(s) on this route. Collect them in sequence, starting with stop 1."
        )
    } else {
        format!("Collect order {} from the vendor.", accepted.task.order_id)
    };

    Notification::new(
        rider_id,
        NotificationKind::RouteAssigned,
        "Delivery assigned",
        message,
        NotificationMetadata {
            order_id: accepted.task.order_id,
            payment_reference: accepted.task.payment_reference.clone(),
            pickup_sequence: accepted.task.pickup_sequence,
            total_stops: Some(accepted.total_stops),
        },
    )
}
