use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::route::stop_label;
use crate::engine::{DispatchError, Dispatcher};
use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
use crate::models::notification::{Notification, NotificationKind, NotificationMetadata};
use crate::notify::fan_out;
use crate::store::TransitionOutcome;

#[derive(Debug, Clone)]
pub struct UpdatedTask {
    pub task: DeliveryTask,
    /// Size of the task's route; `None` for standalone tasks.
    pub total_stops: Option<usize>,
}

impl UpdatedTask {
    pub fn stop_label(&self) -> Option<String> {
        match (self.task.pickup_sequence, self.total_stops) {
            (Some(sequence), Some(total)) => Some(stop_label(sequence, total)),
            _ => None,
        }
    }
}

impl Dispatcher {
    /// Moves a rider's task one step along Pending → Assigned → PickedUp → Delivered.
    pub async fn update_status(
        &self,
        task_id: Uuid,
        rider_id: Uuid,
        new_status: &str,
    ) -> Result<UpdatedTask, DispatchError> {
        let start = Instant::now();
        let result = self.advance(task_id, rider_id, new_status).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => self.metrics.observe("update_status", "success", elapsed),
            Err(err) => {
                self.metrics.observe("update_status", err.outcome(), elapsed);
                warn!(
                    task_id = %task_id,
                    rider_id = %rider_id,
                    requested = new_status,
                    error = %err,
                    "status update rejected"
                );
            }
        }

        let updated = result?;
        match updated.task.status {
            DeliveryStatus::PickedUp => {
                fan_out(
                    self.notifier.as_ref(),
                    &self.metrics,
                    pickup_events(rider_id, &updated),
                )
                .await;
            }
            DeliveryStatus::Delivered => {
                info!(
                    task_id = %updated.task.id,
                    order_id = %updated.task.order_id,
                    "delivery completed; order status propagation is external"
                );
            }
            DeliveryStatus::Pending | DeliveryStatus::Assigned => {}
        }

        Ok(updated)
    }

    async fn advance(
        &self,
        task_id: Uuid,
        rider_id: Uuid,
        new_status: &str,
    ) -> Result<UpdatedTask, DispatchError> {
        let requested = match new_status.parse::<DeliveryStatus>() {
            Ok(DeliveryStatus::Pending) | Err(_) => {
                return Err(DispatchError::InvalidStatus(new_status.to_string()));
            }
            Ok(status) => status,
        };

        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(DispatchError::TaskNotFound(task_id))?;

        if task.rider_id != Some(rider_id) {
            return Err(DispatchError::Forbidden(task_id));
        }

        if task.status.next() != Some(requested) {
            return Err(DispatchError::InvalidTransition {
                current: task.status,
                requested,
            });
        }

        let total_stops = match task.payment_reference.as_deref() {
            Some(reference) => {
                let siblings = self.tasks.by_payment_reference(reference).await?;
                if requested == DeliveryStatus::PickedUp {
                    if let Some(sequence) = task.pickup_sequence {
                        ensure_earlier_stops_collected(&task, sequence, &siblings)?;
                    }
                }
                Some(siblings.len())
            }
            None => None,
        };

        let stored = match self
            .tasks
            .transition(task_id, rider_id, task.status, requested, Utc::now())
            .await?
        {
            TransitionOutcome::Applied(row) => row,
            TransitionOutcome::Stale(row) if row.rider_id != Some(rider_id) => {
                return Err(DispatchError::Forbidden(task_id));
            }
            TransitionOutcome::Stale(row) => {
                return Err(DispatchError::InvalidTransition {
                    current: row.status,
                    requested,
                });
            }
            TransitionOutcome::Missing => return Err(DispatchError::TaskNotFound(task_id)),
        };

        info!(
            task_id = %task_id,
            rider_id = %rider_id,
            from = %task.status,
            to = %stored.status,
            "delivery task status updated"
        );

        Ok(UpdatedTask {
            task: stored,
            total_stops,
        })
    }
}

/// Every sibling with a smaller pickup sequence must already be collected.
fn ensure_earlier_stops_collected(
    task: &DeliveryTask,
    sequence: u32,
    siblings: &[DeliveryTask],
) -> Result<(), DispatchError> {
    let mut waiting_on: Vec<u32> = siblings
        .iter()
        .filter(|sibling| sibling.id != task.id && !sibling.status.is_picked_up())
        .filter_map(|sibling| sibling.pickup_sequence)
        .filter(|earlier| *earlier < sequence)
        .collect();

    if waiting_on.is_empty() {
        return Ok(());
    }

    waiting_on.sort_unstable();
    waiting_on.dedup();
    Err(DispatchError::SequenceBlocked {
        pickup_sequence: sequence,
        waiting_on,
    })
}

fn pickup_events(rider_id: Uuid, updated: &UpdatedTask) -> Vec<Notification> {
    let task = &updated.task;
    let metadata = NotificationMetadata {
        order_id: task.order_id,
        payment_reference: task.payment_reference.clone(),
        pickup_sequence: task.pickup_sequence,
        total_stops: updated.total_stops,
    };

    let vendor_message = match updated.stop_label() {
        Some(label) => format!("Order {} was picked up by the rider ({label}).", task.order_id),
        None => format!("Order {} was picked up by the rider.", task.order_id),
    };
    let rider_message = match updated.stop_label() {
        Some(label) => format!("Pickup of order {} confirmed ({label}).", task.order_id),
        None => format!("Pickup of order {} confirmed.", task.order_id),
    };

    vec![
        Notification::new(
            task.vendor_id,
            NotificationKind::OrderPickedUp,
            "Order picked up",
            vendor_message,
            metadata.clone(),
        ),
        Notification::new(
            rider_id,
            NotificationKind::PickupConfirmed,
            "Pickup confirmed",
            rider_message,
            metadata,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use crate::engine::{DispatchError, Dispatcher};
    use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
    use crate::models::notification::NotificationKind;
    use crate::models::profile::{Profile, Role};
    use crate::notify::NotificationHub;
    use crate::observability::metrics::Metrics;
    use crate::store::{
        DeliveryTaskStore, InMemoryProfileDirectory, InMemoryTaskStore, ProfileDirectory,
    };

    struct Harness {
        dispatcher: Dispatcher,
        tasks: Arc<InMemoryTaskStore>,
        hub: Arc<NotificationHub>,
        rider: Uuid,
    }

    async fn harness() -> Harness {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let profiles = Arc::new(InMemoryProfileDirectory::new());
        let hub = Arc::new(NotificationHub::new(50, 64));
        let rider = profiles
            .insert(Profile {
                id: Uuid::new_v4(),
                name: "rider".to_string(),
                role: Role::Rider,
                location: Some("Lagos".to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id;
        let dispatcher = Dispatcher::new(tasks.clone(), profiles, hub.clone(), Metrics::new());
        Harness {
            dispatcher,
            tasks,
            hub,
            rider,
        }
    }

    async fn add_task(h: &Harness, reference: Option<&str>, offset: i64) -> Uuid {
        let mut task = DeliveryTask::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            reference.map(str::to_string),
            Some("Lagos".to_string()),
        );
        task.created_at = Utc::now() + Duration::seconds(offset);
        h.tasks.insert(task).await.unwrap().id
    }

    async fn status(h: &Harness, id: Uuid) -> DeliveryStatus {
        h.tasks.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn picked_up_only_follows_assigned() {
        let h = harness().await;
        let pending = add_task(&h, None, 0).await;

        // Pending tasks have no rider, so ownership fails first.
        let err = h
            .dispatcher
            .update_status(pending, h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));

        h.dispatcher.accept_task(pending, h.rider).await.unwrap();
        let updated = h
            .dispatcher
            .update_status(pending, h.rider, "PickedUp")
            .await
            .unwrap();
        assert_eq!(updated.task.status, DeliveryStatus::PickedUp);
        assert!(updated.task.picked_up_at.is_some());

        let err = h
            .dispatcher
            .update_status(pending, h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                current: DeliveryStatus::PickedUp,
                requested: DeliveryStatus::PickedUp,
            }
        ));

        h.dispatcher
            .update_status(pending, h.rider, "Delivered")
            .await
            .unwrap();
        let err = h
            .dispatcher
            .update_status(pending, h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                current: DeliveryStatus::Delivered,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pending_task_held_by_rider_cannot_skip_ahead() {
        let h = harness().await;
        let mut task = DeliveryTask::new(Uuid::new_v4(), Uuid::new_v4(), None, None);
        task.rider_id = Some(h.rider);
        let id = h.tasks.insert(task).await.unwrap().id;

        let err = h
            .dispatcher
            .update_status(id, h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                current: DeliveryStatus::Pending,
                requested: DeliveryStatus::PickedUp,
            }
        ));
    }

    #[tokio::test]
    async fn delivered_cannot_skip_pickup_and_assigned_cannot_reenter() {
        let h = harness().await;
        let id = add_task(&h, None, 0).await;
        h.dispatcher.accept_task(id, h.rider).await.unwrap();

        let err = h
            .dispatcher
            .update_status(id, h.rider, "Delivered")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let err = h
            .dispatcher
            .update_status(id, h.rider, "Assigned")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                current: DeliveryStatus::Assigned,
                requested: DeliveryStatus::Assigned,
            }
        ));
        assert_eq!(status(&h, id).await, DeliveryStatus::Assigned);
    }

    #[tokio::test]
    async fn each_step_accepts_only_the_next_status() {
        let h = harness().await;
        let id = add_task(&h, None, 0).await;
        h.dispatcher.accept_task(id, h.rider).await.unwrap();

        let targets = [
            DeliveryStatus::Assigned,
            DeliveryStatus::PickedUp,
            DeliveryStatus::Delivered,
        ];
        let mut current = DeliveryStatus::Assigned;
        while let Some(next) = current.next() {
            for target in targets.into_iter().filter(|t| *t != next) {
                let err = h
                    .dispatcher
                    .update_status(id, h.rider, target.as_str())
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, DispatchError::InvalidTransition { current: c, .. } if c == current),
                    "{current} -> {target}"
                );
            }

            let updated = h
                .dispatcher
                .update_status(id, h.rider, next.as_str())
                .await
                .unwrap();
            assert_eq!(updated.task.status, next);
            current = next;
        }

        assert_eq!(status(&h, id).await, DeliveryStatus::Delivered);
        for target in targets {
            let err = h
                .dispatcher
                .update_status(id, h.rider, target.as_str())
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        }
    }

    #[tokio::test]
    async fn malformed_or_pending_targets_are_invalid_status() {
        let h = harness().await;
        for target in ["Pending", "Cancelled", "pickedup", ""] {
            let err = h
                .dispatcher
                .update_status(Uuid::new_v4(), h.rider, target)
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::InvalidStatus(_)), "{target}");
        }
    }

    #[tokio::test]
    async fn missing_task_and_foreign_rider() {
        let h = harness().await;
        let err = h
            .dispatcher
            .update_status(Uuid::new_v4(), h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TaskNotFound(_)));

        let id = add_task(&h, None, 0).await;
        h.dispatcher.accept_task(id, h.rider).await.unwrap();
        let err = h
            .dispatcher
            .update_status(id, Uuid::new_v4(), "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn route_stops_must_be_collected_in_sequence() {
        let h = harness().await;
        let a = add_task(&h, Some("pay-seq"), 0).await;
        let b = add_task(&h, Some("pay-seq"), 1).await;
        let c = add_task(&h, Some("pay-seq"), 2).await;
        h.dispatcher.accept_task(b, h.rider).await.unwrap();

        let err = h
            .dispatcher
            .update_status(c, h.rider, "PickedUp")
            .await
            .unwrap_err();
        match err {
            DispatchError::SequenceBlocked {
                pickup_sequence,
                waiting_on,
            } => {
                assert_eq!(pickup_sequence, 3);
                assert_eq!(waiting_on, vec![1, 2]);
            }
            other => panic!("expected sequence block, got {other:?}"),
        }
        assert_eq!(status(&h, c).await, DeliveryStatus::Assigned);

        h.dispatcher.update_status(a, h.rider, "PickedUp").await.unwrap();
        let err = h
            .dispatcher
            .update_status(c, h.rider, "PickedUp")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SequenceBlocked { .. }));

        h.dispatcher.update_status(b, h.rider, "PickedUp").await.unwrap();
        h.dispatcher.update_status(a, h.rider, "Delivered").await.unwrap();
        let updated = h
            .dispatcher
            .update_status(c, h.rider, "PickedUp")
            .await
            .unwrap();

        assert_eq!(updated.task.status, DeliveryStatus::PickedUp);
        assert_eq!(updated.total_stops, Some(3));
        assert_eq!(updated.stop_label().as_deref(), Some("stop 3 of 3"));
    }

    #[tokio::test]
    async fn pickup_notifies_vendor_and_rider() {
        let h = harness().await;
        let a = add_task(&h, Some("pay-note"), 0).await;
        add_task(&h, Some("pay-note"), 1).await;
        h.dispatcher.accept_task(a, h.rider).await.unwrap();

        let updated = h
            .dispatcher
            .update_status(a, h.rider, "PickedUp")
            .await
            .unwrap();

        let vendor_feed = h.hub.feed(updated.task.vendor_id);
        let pickup = vendor_feed
            .iter()
            .find(|n| n.kind == NotificationKind::OrderPickedUp)
            .expect("vendor pickup notification");
        assert!(pickup.message.contains("stop 1 of 2"));
        assert_eq!(pickup.metadata.order_id, updated.task.order_id);
        assert_eq!(pickup.metadata.total_stops, Some(2));

        let rider_feed = h.hub.feed(h.rider);
        assert!(
            rider_feed
                .iter()
                .any(|n| n.kind == NotificationKind::PickupConfirmed)
        );
    }

    #[tokio::test]
    async fn timestamps_survive_later_transitions() {
        let h = harness().await;
        let id = add_task(&h, None, 0).await;
        h.dispatcher.accept_task(id, h.rider).await.unwrap();
        let picked = h
            .dispatcher
            .update_status(id, h.rider, "PickedUp")
            .await
            .unwrap();
        let delivered = h
            .dispatcher
            .update_status(id, h.rider, "Delivered")
            .await
            .unwrap();

        assert_eq!(delivered.task.picked_up_at, picked.task.picked_up_at);
        assert!(delivered.task.delivered_at >= delivered.task.picked_up_at);
        assert!(delivered.total_stops.is_none());
    }
}
