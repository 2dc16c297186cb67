use crate::models::delivery_task::DeliveryTask;
use crate::store::{DeliveryTaskStore, StoreError, TaskClaim};

/// Tasks that travel together under one payment reference.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    /// Every task of the route in creation order; just the task itself when standalone.
    pub members: Vec<DeliveryTask>,
    /// The still-unclaimed members to assign, with their pickup sequence.
    pub claims: Vec<TaskClaim>,
    pub is_grouped: bool,
}

impl RoutePlan {
    pub fn total_stops(&self) -> usize {
        self.members.len()
    }
}

/// Builds the assignment plan for `task`.
///
/// Standalone tasks are claimed alone and never get a sequence. Grouped tasks
/// pull in every unclaimed sibling, numbered 1, 2, 3, ... in creation order;
/// siblings that already belong to a rider are left out and keep their number.
pub async fn group_and_sequence(
    store: &dyn DeliveryTaskStore,
    task: &DeliveryTask,
) -> Result<RoutePlan, StoreError> {
    let Some(reference) = task.payment_reference.as_deref() else {
        return Ok(RoutePlan {
            members: vec![task.clone()],
            claims: vec![TaskClaim {
                task_id: task.id,
                pickup_sequence: None,
            }],
            is_grouped: false,
        });
    };

    let members = store.by_payment_reference(reference).await?;
    let claims = members
        .iter()
        .filter(|member| member.is_unclaimed())
        .zip(1u32..)
        .map(|(member, sequence)| TaskClaim {
            task_id: member.id,
            pickup_sequence: Some(sequence),
        })
        .collect();

    Ok(RoutePlan {
        members,
        claims,
        is_grouped: true,
    })
}

pub fn stop_label(pickup_sequence: u32, total_stops: usize) -> String {
    format!("stop {pickup_sequence} of {total_stops}")
}
