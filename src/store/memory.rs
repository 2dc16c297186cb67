use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
use crate::models::profile::Profile;
use crate::store::{
    ClaimOutcome, DeliveryTaskStore, ProfileDirectory, StoreError, TaskClaim, TaskFilter,
    TransitionOutcome,
};

/// Rows of one route live under a single map entry, so holding that entry
/// serialises every write to the route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RouteKey {
    Reference(String),
    Solo(Uuid),
}

impl RouteKey {
    fn of(task: &DeliveryTask) -> Self {
        match &task.payment_reference {
            Some(reference) => RouteKey::Reference(reference.clone()),
            None => RouteKey::Solo(task.id),
        }
    }
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    routes: DashMap<RouteKey, Vec<DeliveryTask>>,
    index: DashMap<Uuid, RouteKey>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn route_key(&self, id: &Uuid) -> Option<RouteKey> {
        self.index.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl DeliveryTaskStore for InMemoryTaskStore {
    async fn insert(&self, task: DeliveryTask) -> Result<DeliveryTask, StoreError> {
        match self.index.entry(task.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(task.id)),
            Entry::Vacant(slot) => {
                let key = RouteKey::of(&task);
                let mut rows = self.routes.entry(key.clone()).or_default();
                let position = rows.partition_point(|row| row.created_at <= task.created_at);
                rows.insert(position, task.clone());
                slot.insert(key);
                Ok(task)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeliveryTask>, StoreError> {
        let Some(key) = self.route_key(&id) else {
            return Ok(None);
        };

        Ok(self
            .routes
            .get(&key)
            .and_then(|rows| rows.iter().find(|row| row.id == id).cloned()))
    }

    async fn by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Vec<DeliveryTask>, StoreError> {
        let key = RouteKey::Reference(reference.to_string());
        Ok(self
            .routes
            .get(&key)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<DeliveryTask>, StoreError> {
        let mut tasks: Vec<DeliveryTask> = self
            .routes
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|task| filter.matches(task))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    async fn claim(
        &self,
        claims: &[TaskClaim],
        rider_id: Uuid,
        assigned_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let Some(first) = claims.first() else {
            return Ok(ClaimOutcome::Claimed(Vec::new()));
        };

        let Some(key) = self.route_key(&first.task_id) else {
            return Ok(ClaimOutcome::Missing(first.task_id));
        };
        for claim in &claims[1..] {
            match self.route_key(&claim.task_id) {
                Some(other) if other == key => {}
                Some(_) => return Err(StoreError::CrossRoute),
                None => return Ok(ClaimOutcome::Missing(claim.task_id)),
            }
        }

        let Some(mut rows) = self.routes.get_mut(&key) else {
            return Ok(ClaimOutcome::Missing(first.task_id));
        };

        let mut positions = Vec::with_capacity(claims.len());
        for claim in claims {
            let Some(position) = rows.iter().position(|row| row.id == claim.task_id) else {
                return Ok(ClaimOutcome::Missing(claim.task_id));
            };
            if !rows[position].is_unclaimed() {
                return Ok(ClaimOutcome::Conflict(rows[position].clone()));
            }
            positions.push(position);
        }

        let mut claimed = Vec::with_capacity(claims.len());
        for (claim, position) in claims.iter().zip(positions) {
            let row = &mut rows[position];
            row.rider_id = Some(rider_id);
            row.enter_status(DeliveryStatus::Assigned, assigned_at);
            if row.pickup_sequence.is_none() {
                row.pickup_sequence = claim.pickup_sequence;
            }
            claimed.push(row.clone());
        }

        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn transition(
        &self,
        id: Uuid,
        rider_id: Uuid,
        from: DeliveryStatus,
        to: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let Some(key) = self.route_key(&id) else {
            return Ok(TransitionOutcome::Missing);
        };
        let Some(mut rows) = self.routes.get_mut(&key) else {
            return Ok(TransitionOutcome::Missing);
        };
        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(TransitionOutcome::Missing);
        };

        if row.rider_id != Some(rider_id) || row.status != from {
            return Ok(TransitionOutcome::Stale(row.clone()));
        }

        row.enter_status(to, at);
        Ok(TransitionOutcome::Applied(row.clone()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.index.len())
    }
}

#[derive(Default)]
pub struct InMemoryProfileDirectory {
    profiles: DashMap<Uuid, Profile>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn insert(&self, profile: Profile) -> Result<Profile, StoreError> {
        match self.profiles.entry(profile.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(profile.id)),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(profile)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.profiles.len())
    }
}
